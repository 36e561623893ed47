//! Scenes, view layers, timeline markers and collections.

use super::object::AnimData;
use super::IdHandle;

/// A named camera switch on the timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeMarker {
    pub frame: i32,
    pub name: String,
    pub camera: Option<IdHandle>,
}

impl TimeMarker {
    pub fn new(frame: i32, name: impl Into<String>) -> Self {
        Self {
            frame,
            name: name.into(),
            camera: None,
        }
    }

    pub fn with_camera(mut self, camera: IdHandle) -> Self {
        self.camera = Some(camera);
        self
    }
}

/// A view layer selects which collections of the scene are evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewLayer {
    pub name: String,
    pub excluded_collections: Vec<IdHandle>,
    pub use_for_render: bool,
}

impl ViewLayer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            excluded_collections: Vec::new(),
            use_for_render: true,
        }
    }

    pub fn excludes(&self, collection: IdHandle) -> bool {
        self.excluded_collections.contains(&collection)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Scene {
    /// Root of the scene's collection hierarchy.
    pub master_collection: Option<IdHandle>,
    pub view_layers: Vec<ViewLayer>,
    /// Active camera object.
    pub camera: Option<IdHandle>,
    pub markers: Vec<TimeMarker>,
    pub world: Option<IdHandle>,
    /// Compositing node tree.
    pub compositor_tree: Option<IdHandle>,
    pub use_sequencer: bool,
    pub use_audio: bool,
    pub anim: Option<AnimData>,
}

impl Scene {
    pub fn new(master_collection: IdHandle) -> Self {
        Self {
            master_collection: Some(master_collection),
            view_layers: vec![ViewLayer::new("ViewLayer")],
            ..Self::default()
        }
    }

    pub fn view_layer(&self, name: &str) -> Option<&ViewLayer> {
        self.view_layers.iter().find(|layer| layer.name == name)
    }

    /// Camera objects referenced by markers, excluding the active camera and
    /// duplicates, in marker order.
    pub fn marker_cameras(&self) -> Vec<IdHandle> {
        let mut cameras: Vec<IdHandle> = Vec::new();
        for marker in &self.markers {
            if let Some(camera) = marker.camera {
                if Some(camera) != self.camera && !cameras.contains(&camera) {
                    cameras.push(camera);
                }
            }
        }
        cameras
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Collection {
    pub objects: Vec<IdHandle>,
    pub children: Vec<IdHandle>,
    pub hide_viewport: bool,
    pub hide_render: bool,
}

impl Collection {
    pub fn with_objects(objects: impl IntoIterator<Item = IdHandle>) -> Self {
        Self {
            objects: objects.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_child(mut self, child: IdHandle) -> Self {
        self.children.push(child);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_cameras_skip_active_and_duplicates() {
        let c0 = IdHandle::from_raw(0);
        let c1 = IdHandle::from_raw(1);
        let mut scene = Scene::new(IdHandle::from_raw(10));
        scene.camera = Some(c0);
        scene.markers = vec![
            TimeMarker::new(1, "A").with_camera(c0),
            TimeMarker::new(5, "B").with_camera(c1),
            TimeMarker::new(9, "C").with_camera(c1),
            TimeMarker::new(12, "D"),
        ];
        assert_eq!(scene.marker_cameras(), vec![c1]);
    }
}
