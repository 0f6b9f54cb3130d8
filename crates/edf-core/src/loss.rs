//! Denoising score-matching loss.
//!
//! Raw targets are brought to the network's convention before comparison:
//! `target · sqrt(time) · mult` per channel. The loss is the batch mean of the
//! squared L2 error, summed over the angular and linear channels.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::constants::EPSILON;
use crate::error::{EdfError, Result};
use crate::pose::{Pose, to_f32_records};
use crate::quaternion::dot3;
use crate::score::{GradMode, ScoreModel, ScorePair, ScoreScaling};

/// Keys of [`TrainStatistics::entries`], in order.
pub const STATISTIC_KEYS: [&str; 11] = [
    "Loss/train",
    "Loss/angular",
    "Loss/linear",
    "norm/target_ang",
    "norm/target_lin",
    "norm/inferred_ang",
    "norm/inferred_lin",
    "alignment/unnormalized/ang",
    "alignment/unnormalized/lin",
    "alignment/normalized/ang",
    "alignment/normalized/lin",
];

/// Batch-mean diagnostics for one loss evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct TrainStatistics {
    #[serde(rename = "Loss/train")]
    pub loss: f64,
    #[serde(rename = "Loss/angular")]
    pub ang_loss: f64,
    #[serde(rename = "Loss/linear")]
    pub lin_loss: f64,
    #[serde(rename = "norm/target_ang")]
    pub target_norm_ang: f64,
    #[serde(rename = "norm/target_lin")]
    pub target_norm_lin: f64,
    #[serde(rename = "norm/inferred_ang")]
    pub inferred_norm_ang: f64,
    #[serde(rename = "norm/inferred_lin")]
    pub inferred_norm_lin: f64,
    #[serde(rename = "alignment/unnormalized/ang")]
    pub alignment_ang: f64,
    #[serde(rename = "alignment/unnormalized/lin")]
    pub alignment_lin: f64,
    #[serde(rename = "alignment/normalized/ang")]
    pub alignment_normalized_ang: f64,
    #[serde(rename = "alignment/normalized/lin")]
    pub alignment_normalized_lin: f64,
}

impl TrainStatistics {
    pub fn entries(&self) -> [(&'static str, f64); 11] {
        let values = [
            self.loss,
            self.ang_loss,
            self.lin_loss,
            self.target_norm_ang,
            self.target_norm_lin,
            self.inferred_norm_ang,
            self.inferred_norm_lin,
            self.alignment_ang,
            self.alignment_lin,
            self.alignment_normalized_ang,
            self.alignment_normalized_lin,
        ];
        let mut out = [("", 0.0); 11];
        for (slot, (key, value)) in out.iter_mut().zip(STATISTIC_KEYS.iter().zip(values)) {
            *slot = (*key, value);
        }
        out
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries()
            .into_iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    pub fn to_map(&self) -> BTreeMap<&'static str, f64> {
        self.entries().into_iter().collect()
    }
}

/// Contexts handed back for downstream use. The key context is not
/// retained.
#[derive(Debug)]
pub struct ContextBundle<K, Q> {
    pub key: Option<Vec<K>>,
    pub query: Option<Q>,
}

/// `∂loss/∂score` per pose, for hosts that backpropagate by hand.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ScoreGradient {
    pub angular: Vec<[f64; 3]>,
    pub linear: Vec<[f64; 3]>,
}

#[derive(Debug)]
pub struct TrainLoss<K, Q> {
    pub loss: f64,
    pub contexts: ContextBundle<K, Q>,
    /// The model's predictions, unscaled.
    pub scores: ScorePair,
    pub gradient: ScoreGradient,
    pub statistics: TrainStatistics,
}

pub struct LossEngine<'m, M: ScoreModel> {
    model: &'m M,
    scaling: ScoreScaling,
}

impl<'m, M: ScoreModel> LossEngine<'m, M> {
    pub fn new(model: &'m M) -> Result<Self> {
        let s = model.scaling();
        let scaling = ScoreScaling::new(s.ang_mult(), s.lin_mult())?;
        Ok(Self { model, scaling })
    }

    /// Build contexts from the raw point sets, then evaluate the loss.
    pub fn train_loss(
        &self,
        poses: &[Pose],
        time: &[f64],
        key_points: &M::Points,
        query_points: &M::Points,
        target_ang: &[[f64; 3]],
        target_lin: &[[f64; 3]],
    ) -> Result<TrainLoss<M::KeyContext, M::QueryContext>> {
        check_batch(poses.len(), time, target_ang, target_lin)?;
        let key = self.model.key_context_multiscale(key_points)?;
        let query = self.model.query_context(query_points)?;
        self.loss_from_contexts(poses, time, &key, query, target_ang, target_lin)
    }

    /// Evaluate the loss against contexts the caller already built.
    pub fn loss_from_contexts(
        &self,
        poses: &[Pose],
        time: &[f64],
        key: &[M::KeyContext],
        query: M::QueryContext,
        target_ang: &[[f64; 3]],
        target_lin: &[[f64; 3]],
    ) -> Result<TrainLoss<M::KeyContext, M::QueryContext>> {
        let n = check_batch(poses.len(), time, target_ang, target_lin)?;

        let records = to_f32_records(poses);
        let time_f32: Vec<f32> = time.iter().map(|&t| t as f32).collect();
        let scores = self
            .model
            .score(&records, key, &query, &time_f32, GradMode::Training)?;
        scores.expect_len(n)?;
        if !scores.is_finite() {
            return Err(EdfError::NumericalDivergence(
                "score model returned non-finite scores".into(),
            ));
        }

        let ang = channel(&scores.angular, target_ang, time, self.scaling.ang_mult())?;
        let lin = channel(&scores.linear, target_lin, time, self.scaling.lin_mult())?;

        let loss = ang.loss + lin.loss;
        let statistics = TrainStatistics {
            loss,
            ang_loss: ang.loss,
            lin_loss: lin.loss,
            target_norm_ang: ang.target_norm,
            target_norm_lin: lin.target_norm,
            inferred_norm_ang: ang.inferred_norm,
            inferred_norm_lin: lin.inferred_norm,
            alignment_ang: ang.alignment,
            alignment_lin: lin.alignment,
            alignment_normalized_ang: ang.alignment_normalized,
            alignment_normalized_lin: lin.alignment_normalized,
        };
        tracing::debug!(
            batch = n,
            loss,
            ang_loss = ang.loss,
            lin_loss = lin.loss,
            "score matching loss"
        );

        Ok(TrainLoss {
            loss,
            contexts: ContextBundle {
                key: None,
                query: Some(query),
            },
            scores,
            gradient: ScoreGradient {
                angular: ang.gradient,
                linear: lin.gradient,
            },
            statistics,
        })
    }
}

fn check_batch(
    n: usize,
    time: &[f64],
    target_ang: &[[f64; 3]],
    target_lin: &[[f64; 3]],
) -> Result<usize> {
    if time.len() != n || target_ang.len() != n || target_lin.len() != n {
        return Err(EdfError::ShapeMismatch(format!(
            "batch of {n} poses with {} time values, {} angular and {} linear targets",
            time.len(),
            target_ang.len(),
            target_lin.len()
        )));
    }
    if n == 0 {
        return Err(EdfError::ShapeMismatch("empty batch".into()));
    }
    if let Some((index, &value)) = time
        .iter()
        .enumerate()
        .find(|(_, t)| !t.is_finite() || **t < 0.0)
    {
        return Err(EdfError::InvalidTime { index, value });
    }
    Ok(n)
}

struct ChannelStats {
    loss: f64,
    target_norm: f64,
    inferred_norm: f64,
    alignment: f64,
    alignment_normalized: f64,
    gradient: Vec<[f64; 3]>,
}

fn channel(
    predicted: &[[f32; 3]],
    raw_target: &[[f64; 3]],
    time: &[f64],
    mult: f64,
) -> Result<ChannelStats> {
    let n = predicted.len() as f64;
    let mut stats = ChannelStats {
        loss: 0.0,
        target_norm: 0.0,
        inferred_norm: 0.0,
        alignment: 0.0,
        alignment_normalized: 0.0,
        gradient: Vec::with_capacity(predicted.len()),
    };
    let mut cosine_sum = 0.0;
    let mut cosine_count = 0usize;

    for ((pred, raw), &t) in predicted.iter().zip(raw_target).zip(time) {
        let scale = t.sqrt() * mult;
        let target = raw.map(|c| c * scale);
        if !target.iter().all(|c| c.is_finite()) {
            return Err(EdfError::NumericalDivergence(
                "non-finite scaled target score".into(),
            ));
        }
        let pred = pred.map(f64::from);
        let diff = [target[0] - pred[0], target[1] - pred[1], target[2] - pred[2]];

        stats.loss += dot3(diff, diff);
        stats.gradient.push(diff.map(|d| -2.0 * d / n));

        let target_norm = dot3(target, target).sqrt();
        let pred_norm = dot3(pred, pred).sqrt();
        let dp = dot3(pred, target);
        stats.target_norm += target_norm;
        stats.inferred_norm += pred_norm;
        stats.alignment += dp;
        // Cosine is undefined for a zero vector; such pairs are left out.
        if target_norm > EPSILON && pred_norm > EPSILON {
            cosine_sum += (dp / (target_norm * pred_norm)).clamp(-1.0, 1.0);
            cosine_count += 1;
        }
    }

    stats.loss /= n;
    stats.target_norm /= n;
    stats.inferred_norm /= n;
    stats.alignment /= n;
    stats.alignment_normalized = if cosine_count == 0 {
        0.0
    } else {
        cosine_sum / cosine_count as f64
    };
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::reference::{FnScore, ZeroScore};

    fn batch(n: usize) -> Vec<Pose> {
        vec![Pose::identity(); n]
    }

    /// Model that predicts a fixed set of scores regardless of input.
    fn constant(
        scaling: ScoreScaling,
        angular: Vec<[f32; 3]>,
        linear: Vec<[f32; 3]>,
    ) -> FnScore<impl Fn(&[[f32; 7]], &[f32]) -> Result<ScorePair>> {
        FnScore::new(scaling, move |_poses: &[[f32; 7]], _t: &[f32]| {
            Ok(ScorePair {
                angular: angular.clone(),
                linear: linear.clone(),
            })
        })
    }

    #[test]
    fn test_exact_prediction_gives_zero_loss() {
        // time = 0.25 → sqrt = 0.5; ang_mult 2, lin_mult 4
        let scaling = ScoreScaling::new(2.0, 4.0).unwrap();
        let model = constant(
            scaling,
            vec![[1.0, -2.0, 0.5], [0.0, 0.0, 3.0]],
            vec![[2.0, 0.0, 0.0], [-4.0, 2.0, 6.0]],
        );
        let engine = LossEngine::new(&model).unwrap();
        let result = engine
            .train_loss(
                &batch(2),
                &[0.25, 0.25],
                &(),
                &(),
                &[[1.0, -2.0, 0.5], [0.0, 0.0, 3.0]],
                &[[1.0, 0.0, 0.0], [-2.0, 1.0, 3.0]],
            )
            .unwrap();
        assert!(result.loss.abs() < 1e-12, "loss = {}", result.loss);
        assert_abs_diff_eq!(result.statistics.alignment_normalized_ang, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.statistics.alignment_normalized_lin, 1.0, epsilon = 1e-9);
        assert!(result.gradient.angular.iter().flatten().all(|g| g.abs() < 1e-12));
    }

    #[test]
    fn test_loss_is_mean_squared_error_per_channel() {
        let model = ZeroScore::default();
        let engine = LossEngine::new(&model).unwrap();
        let result = engine
            .train_loss(
                &batch(2),
                &[1.0, 4.0],
                &(),
                &(),
                &[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                &[[0.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
            )
            .unwrap();
        // ang: (1² + 2²) / 2 = 2.5, lin: (0 + 2²) / 2 = 2.0
        assert_abs_diff_eq!(result.statistics.ang_loss, 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(result.statistics.lin_loss, 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result.loss, 4.5, epsilon = 1e-12);
        assert_eq!(result.statistics.loss, result.loss);
        assert_abs_diff_eq!(result.statistics.target_norm_ang, 1.5, epsilon = 1e-12);
        assert_eq!(result.statistics.inferred_norm_ang, 0.0);
    }

    #[test]
    fn test_zero_prediction_alignment_is_guarded() {
        let model = ZeroScore::default();
        let engine = LossEngine::new(&model).unwrap();
        let result = engine
            .train_loss(&batch(1), &[1.0], &(), &(), &[[1.0, 0.0, 0.0]], &[[0.0, 1.0, 0.0]])
            .unwrap();
        assert_eq!(result.statistics.alignment_normalized_ang, 0.0);
        assert_eq!(result.statistics.alignment_normalized_lin, 0.0);
        assert!(result.statistics.to_map().values().all(|v| v.is_finite()));
    }

    #[test]
    fn test_opposite_prediction_has_negative_alignment() {
        let model = constant(ScoreScaling::unit(), vec![[-1.0, 0.0, 0.0]], vec![[0.0, 2.0, 0.0]]);
        let engine = LossEngine::new(&model).unwrap();
        let result = engine
            .train_loss(&batch(1), &[1.0], &(), &(), &[[1.0, 0.0, 0.0]], &[[0.0, 1.0, 0.0]])
            .unwrap();
        assert_abs_diff_eq!(result.statistics.alignment_normalized_ang, -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result.statistics.alignment_ang, -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(result.statistics.alignment_lin, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let pred = [0.3f32, -0.1, 0.7];
        let target = [[0.5, 0.2, -0.4]];
        let model = constant(ScoreScaling::unit(), vec![pred], vec![[0.0; 3]]);
        let engine = LossEngine::new(&model).unwrap();
        let base = engine
            .train_loss(&batch(1), &[1.0], &(), &(), &target, &[[0.0; 3]])
            .unwrap();
        let h = 1e-3f32;
        let bumped = constant(
            ScoreScaling::unit(),
            vec![[pred[0] + h, pred[1], pred[2]]],
            vec![[0.0; 3]],
        );
        let bumped_loss = LossEngine::new(&bumped)
            .unwrap()
            .train_loss(&batch(1), &[1.0], &(), &(), &target, &[[0.0; 3]])
            .unwrap()
            .loss;
        let numeric = (bumped_loss - base.loss) / f64::from(h);
        assert_abs_diff_eq!(numeric, base.gradient.angular[0][0], epsilon = 1e-2);
    }

    #[test]
    fn test_shape_mismatch() {
        let model = ZeroScore::default();
        let engine = LossEngine::new(&model).unwrap();
        let err = engine
            .train_loss(&batch(2), &[1.0], &(), &(), &[[0.0; 3]; 2], &[[0.0; 3]; 2])
            .unwrap_err();
        assert!(matches!(err, EdfError::ShapeMismatch(_)));
        let err = engine
            .train_loss(&batch(2), &[1.0; 2], &(), &(), &[[0.0; 3]; 2], &[[0.0; 3]; 3])
            .unwrap_err();
        assert!(matches!(err, EdfError::ShapeMismatch(_)));
        let err = engine.train_loss(&[], &[], &(), &(), &[], &[]).unwrap_err();
        assert!(matches!(err, EdfError::ShapeMismatch(_)));
    }

    #[test]
    fn test_short_model_output_is_shape_mismatch() {
        let model = constant(ScoreScaling::unit(), vec![[0.0; 3]], vec![[0.0; 3]]);
        let engine = LossEngine::new(&model).unwrap();
        let err = engine
            .train_loss(&batch(3), &[1.0; 3], &(), &(), &[[0.0; 3]; 3], &[[0.0; 3]; 3])
            .unwrap_err();
        assert!(matches!(err, EdfError::ShapeMismatch(_)));
    }

    #[test]
    fn test_non_finite_model_output_is_divergence() {
        for bad in [f32::NAN, f32::INFINITY] {
            let model = constant(ScoreScaling::unit(), vec![[0.0; 3]], vec![[bad, 0.0, 0.0]]);
            let engine = LossEngine::new(&model).unwrap();
            let err = engine
                .train_loss(&batch(1), &[1.0], &(), &(), &[[0.0; 3]], &[[0.0; 3]])
                .unwrap_err();
            assert!(matches!(err, EdfError::NumericalDivergence(_)));
        }
    }

    #[test]
    fn test_negative_time_rejected() {
        let model = ZeroScore::default();
        let engine = LossEngine::new(&model).unwrap();
        let err = engine
            .train_loss(&batch(2), &[1.0, -0.5], &(), &(), &[[0.0; 3]; 2], &[[0.0; 3]; 2])
            .unwrap_err();
        assert_eq!(err, EdfError::InvalidTime { index: 1, value: -0.5 });
    }

    #[test]
    fn test_statistics_keys_and_bundle() {
        let model = ZeroScore::default();
        let engine = LossEngine::new(&model).unwrap();
        let result = engine
            .train_loss(&batch(1), &[1.0], &(), &(), &[[1.0; 3]], &[[1.0; 3]])
            .unwrap();
        let keys: Vec<&str> = result.statistics.to_map().keys().copied().collect();
        let mut expected = STATISTIC_KEYS.to_vec();
        expected.sort_unstable();
        assert_eq!(keys, expected);
        assert_eq!(result.statistics.get("Loss/train"), Some(result.loss));
        assert!(result.contexts.key.is_none());
        assert!(result.contexts.query.is_some());

        let json = serde_json::to_value(result.statistics).unwrap();
        assert!(json.get("alignment/normalized/lin").is_some());
    }
}
