//! Synthetic landmark sets for tests

use crate::types::{LandmarkSet, Point};

const MESH_POINTS: usize = 468;

/// Forward-facing face with open eyes (EAR 0.3), closed mouth and nose at center
pub(crate) fn attentive_face() -> LandmarkSet {
    let mut face = LandmarkSet::new(vec![Point::new(0.5, 0.5); MESH_POINTS]);

    // Left eye: P0..P5 = 362, 385, 387, 263, 373, 380
    face.set(362, Point::new(0.56, 0.45));
    face.set(385, Point::new(0.59, 0.435));
    face.set(387, Point::new(0.63, 0.435));
    face.set(263, Point::new(0.66, 0.45));
    face.set(373, Point::new(0.63, 0.465));
    face.set(380, Point::new(0.59, 0.465));

    // Right eye: P0..P5 = 33, 160, 158, 133, 153, 144
    face.set(33, Point::new(0.34, 0.45));
    face.set(160, Point::new(0.37, 0.435));
    face.set(158, Point::new(0.41, 0.435));
    face.set(133, Point::new(0.44, 0.45));
    face.set(153, Point::new(0.41, 0.465));
    face.set(144, Point::new(0.37, 0.465));

    face.set(1, Point::new(0.5, 0.5));

    face.set(13, Point::new(0.5, 0.605));
    face.set(14, Point::new(0.5, 0.615));
    face.set(81, Point::new(0.47, 0.61));
    face.set(82, Point::new(0.53, 0.61));

    face
}

/// Same face with both eyelids flat on the eye line (EAR 0)
pub(crate) fn closed_eye_face() -> LandmarkSet {
    let mut face = attentive_face();
    for (index, x) in [(385, 0.59), (387, 0.63), (373, 0.63), (380, 0.59)] {
        face.set(index, Point::new(x, 0.45));
    }
    for (index, x) in [(160, 0.37), (158, 0.41), (153, 0.41), (144, 0.37)] {
        face.set(index, Point::new(x, 0.45));
    }
    face
}

/// Attentive face with the nose moved to `(x, y)`
pub(crate) fn face_with_nose(x: f64, y: f64) -> LandmarkSet {
    let mut face = attentive_face();
    face.set(1, Point::new(x, y));
    face
}
