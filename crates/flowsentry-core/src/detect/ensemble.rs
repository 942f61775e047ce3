//! Ensemble merge of per-detector window results.

use crate::config::DetectorSet;
use crate::WindowResult;

/// Merges up to three per-detector results into one transported verdict.
///
/// Identity fields and ground truth come from the first present input.
/// Scores, predictions and auxiliary metrics are copied per enabled
/// detector; the combined prediction is a boolean OR. The suspect list is
/// the multiset union over detectors that predicted an attack.
pub fn merge_results(
    entropy: Option<&WindowResult>,
    pca: Option<&WindowResult>,
    cusum: Option<&WindowResult>,
    detectors: DetectorSet,
) -> WindowResult {
    let mut merged = WindowResult::default();
    let Some(reference) = entropy.or(pca).or(cusum) else {
        return merged;
    };
    merged.window_id = reference.window_id;
    merged.start_row = reference.start_row;
    merged.end_row = reference.end_row;
    merged.flow_count = reference.flow_count;
    merged.ground_truth = reference.ground_truth;

    if detectors.entropy {
        if let Some(result) = entropy {
            merged.entropy_score = result.entropy_score;
            merged.entropy_pred = result.entropy_pred;
            merged.norm_entropy_src = result.norm_entropy_src;
            merged.norm_entropy_dst = result.norm_entropy_dst;
            if result.entropy_pred {
                merged.suspects.merge_counts(&result.suspects);
            }
        }
    }
    if detectors.pca {
        if let Some(result) = pca {
            merged.pca_score = result.pca_score;
            merged.pca_pred = result.pca_pred;
            merged.pca_spe = result.pca_spe;
            merged.pca_t2 = result.pca_t2;
            if result.pca_pred {
                merged.suspects.merge_counts(&result.suspects);
            }
        }
    }
    if detectors.cusum {
        if let Some(result) = cusum {
            merged.cusum_score = result.cusum_score;
            merged.cusum_pred = result.cusum_pred;
            merged.cusum_positive = result.cusum_positive;
            merged.cusum_negative = result.cusum_negative;
            if result.cusum_pred {
                merged.suspects.merge_counts(&result.suspects);
            }
        }
    }

    merged.combined_pred = merged.entropy_pred || merged.pca_pred || merged.cusum_pred;
    merged
}
