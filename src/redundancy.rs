//! Detection of fake and redundant (mirrored) outputs
//!
//! Display servers report no explicit "this output clones that one" relation,
//! so mirrors are inferred from geometry. An output is redundant if its
//! rectangle lies inside another real output's rectangle and that other output
//! wins the tie-break:
//! - a bigger output (wider or taller) wins over a smaller one
//! - an output with a screen id wins over one that has none yet
//! - between two known outputs, the lower id wins (so the primary always wins)

use crate::types::{Output, ScreenId};

/// Placeholder outputs: no name, no usable geometry, or a known sentinel name
pub fn is_output_fake(output: &Output, fake_names: &[String]) -> bool {
    output.name.is_empty()
        || output.geometry.is_empty()
        || fake_names.iter().any(|fake| *fake == output.name)
}

/// Whether `candidate` is a mirror of some other output in `outputs`.
///
/// Comparison is pairwise against every other output; fake outputs and
/// outputs without geometry never make another output redundant.
pub fn is_output_redundant<F>(
    candidate: &Output,
    outputs: &[Output],
    fake_names: &[String],
    id_of: F,
) -> bool
where
    F: Fn(&str) -> Option<ScreenId>,
{
    let this_geometry = candidate.geometry;
    let this_id = id_of(&candidate.name);

    outputs.iter().any(|other| {
        if other.handle == candidate.handle
            || other.geometry.is_null()
            || is_output_fake(other, fake_names)
        {
            return false;
        }

        let other_geometry = other.geometry;
        if !other_geometry.contains(&this_geometry) {
            return false;
        }

        // Containment holds, so a larger side means a larger area
        let other_is_bigger =
            other_geometry.width > this_geometry.width || other_geometry.height > this_geometry.height;

        let other_id_wins = match (this_id, id_of(&other.name)) {
            (None, Some(_)) => true,
            (Some(this), Some(other)) => this > other,
            _ => false,
        };

        other_is_bigger || other_id_wins
    })
}

/// Fake or redundant outputs never reach the logical screen set
pub fn is_output_suppressed<F>(
    candidate: &Output,
    outputs: &[Output],
    fake_names: &[String],
    id_of: F,
) -> bool
where
    F: Fn(&str) -> Option<ScreenId>,
{
    is_output_fake(candidate, fake_names) || is_output_redundant(candidate, outputs, fake_names, id_of)
}
