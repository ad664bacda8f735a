//! Joint angles from three planar landmarks.

use crate::error::ComputationError;
use crate::landmark::Landmark;

/// Interior angle at `vertex`, in degrees, formed by `first` and `third`.
///
/// Uses the law of cosines on the 2D side lengths; depth and visibility are
/// ignored. Fails when either limb segment has zero length, since the angle is
/// undefined there, and when any coordinate is NaN or infinite.
pub fn angle(
    first: &Landmark,
    vertex: &Landmark,
    third: &Landmark,
) -> Result<f64, ComputationError> {
    let finite = [first, vertex, third]
        .iter()
        .all(|p| p.x.is_finite() && p.y.is_finite());
    if !finite {
        return Err(ComputationError::NonFinite {
            quantity: "coordinate",
        });
    }

    let a = first.planar_distance(vertex);
    let b = third.planar_distance(vertex);
    let c = first.planar_distance(third);

    if a == 0.0 {
        return Err(ComputationError::CoincidentPoints {
            first: "proximal",
            second: "vertex",
        });
    }
    if b == 0.0 {
        return Err(ComputationError::CoincidentPoints {
            first: "distal",
            second: "vertex",
        });
    }

    let cosine = (a * a + b * b - c * c) / (2.0 * a * b);
    if !cosine.is_finite() {
        return Err(ComputationError::NonFinite { quantity: "cosine" });
    }

    // Only absorbs floating-point rounding on near-collinear triples
    let cosine = cosine.clamp(-1.0, 1.0);

    Ok(cosine.acos().to_degrees())
}
