use std::collections::{BTreeMap, BTreeSet};

use loom_ir::{AccessMode, CoordAxis, HardwareToken};

use crate::spec::{Bindings, BackendSpec};

/// The reference visual/GPU backend: owns `camera`/`gpu` hardware, the built-ins
/// that read from them (`camera`, `texture`, `sample`), and presents `display` as
/// its sink. Binds `x, y` free and `t` bound — one time value shared by every pixel
/// evaluated this frame (§6 "Coordinate axes on `me`").
pub fn visual_backend_spec() -> BackendSpec {
    let mut coordinate_spec = BTreeMap::new();
    coordinate_spec.insert(CoordAxis::X, AccessMode::Free);
    coordinate_spec.insert(CoordAxis::Y, AccessMode::Free);
    coordinate_spec.insert(CoordAxis::T, AccessMode::Bound);

    BackendSpec {
        identifier: "visual".into(),
        owned_hardware: BTreeSet::from([HardwareToken::Camera, HardwareToken::Gpu]),
        owned_builtins: BTreeSet::from(["camera".to_string(), "texture".to_string(), "sample".to_string()]),
        external_builtins: BTreeSet::new(),
        coordinate_spec,
        bindings: Bindings { sinks: BTreeSet::from(["display".to_string()]), sources: BTreeSet::new() },
    }
}

/// The reference audio backend: owns `microphone`/`speaker` hardware, the
/// `microphone` built-in, and presents `play` as its sink. Binds `i` free (the
/// sample index within a buffer) and `t`, `sampleRate` bound — fixed for the whole
/// callback.
pub fn audio_backend_spec() -> BackendSpec {
    let mut coordinate_spec = BTreeMap::new();
    coordinate_spec.insert(CoordAxis::I, AccessMode::Free);
    coordinate_spec.insert(CoordAxis::T, AccessMode::Bound);
    coordinate_spec.insert(CoordAxis::SampleRate, AccessMode::Bound);

    BackendSpec {
        identifier: "audio".into(),
        owned_hardware: BTreeSet::from([HardwareToken::Microphone, HardwareToken::Speaker]),
        owned_builtins: BTreeSet::from(["microphone".to_string()]),
        external_builtins: BTreeSet::new(),
        coordinate_spec,
        bindings: Bindings { sinks: BTreeSet::from(["play".to_string()]), sources: BTreeSet::new() },
    }
}
