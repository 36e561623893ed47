//! Mesh attribute masks requested from the geometry evaluator.

use bitflags::bitflags;

bitflags! {
    /// Geometry attribute layers a downstream user needs to be kept.
    ///
    /// Masks only ever grow during a build: every request is OR-ed into the
    /// object's accumulated mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
    pub struct CustomDataMask: u64 {
        const VERTEX_GROUP = 1 << 0;
        const UV = 1 << 1;
        const COLOR = 1 << 2;
        const NORMAL = 1 << 3;
        const ORIGINDEX = 1 << 4;
        const TANGENT = 1 << 5;
        const CREASE = 1 << 6;
        const SHAPE_KEY = 1 << 7;
        const SHARP_FACE = 1 << 8;
        const MATERIAL_INDEX = 1 << 9;
    }
}
