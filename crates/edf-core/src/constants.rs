/// Numerical epsilon for near-zero comparisons
pub const EPSILON: f64 = 1e-10;

/// Squared rotation angle below which exp/log use their series expansions
pub const SMALL_ANGLE_THRESHOLD: f64 = 1e-12;

/// Allowed drift of a quaternion norm from 1.0 after an integration step
pub const UNIT_NORM_TOLERANCE: f64 = 1e-5;

/// Gather pattern for the rows of `L(q)`: row `i` reads `q[Q_INDICES[i][j]]`.
pub const Q_INDICES: [[usize; 3]; 4] = [[1, 2, 3], [0, 3, 2], [3, 0, 1], [2, 1, 0]];

/// Sign/scale pattern for the rows of `L(q)`.
/// Together with [`Q_INDICES`] this encodes `L(q)·ω = ½ q ⊗ (0, ω)`.
pub const Q_FACTOR: [[f64; 3]; 4] = [
    [-0.5, -0.5, -0.5],
    [0.5, -0.5, 0.5],
    [0.5, 0.5, -0.5],
    [-0.5, 0.5, 0.5],
];
