//! Depsgraph Core
//!
//! This crate builds and maintains the dependency graph a scene is
//! evaluated with. It implements:
//!
//! - Graph construction from the host's main database
//! - Relations between evaluation operations, with cycle breaking
//! - Tagging of changed data-blocks and flushing along relations
//! - An evaluation order and a simple evaluation driver
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `host`: the main database of data-blocks a graph is built from
//! - `graph`: keys, nodes, relations and the graph store
//! - `builder`: node and relation passes, builder pipelines
//! - `tag`: recalc flags and the flush engine
//! - `registry`: live graphs per main database
//! - `api`: the public entry points
//! - `eval`, `debug`: evaluation driver and graph dumps
//!
//! # Example
//!
//! ```rust,ignore
//! use depsgraph_core::api;
//! use depsgraph_core::host::{Collection, Main, MainDatabase, Object, ObjectType, Scene};
//! use depsgraph_core::{EvaluationMode, RecalcFlags, UpdateSource};
//!
//! let mut main = Main::new();
//! let parent = main.add_object("Parent", Object::new(ObjectType::Empty));
//! let child = main.add_object("Child", Object::new(ObjectType::Empty).with_parent(parent));
//! let master = main.add_collection("Master", Collection::with_objects([parent, child]));
//! let scene = main.add_scene("Scene", Scene::new(master));
//! let main = MainDatabase::new(main);
//!
//! let graph = api::graph_new(&main, scene, "ViewLayer", EvaluationMode::Viewport)?;
//! api::graph_build_view_layer(&graph)?;
//! api::graph_evaluate(&graph)?;
//!
//! // Moving the parent re-evaluates the child's transform
//! api::graph_id_tag_update(&graph, parent, RecalcFlags::TRANSFORM, UpdateSource::UserEdit);
//! let report = api::graph_evaluate(&graph)?;
//! ```

pub mod api;
pub mod builder;
pub mod config;
pub mod debug;
pub mod error;
pub mod eval;
pub mod graph;
pub mod host;
pub mod registry;
pub mod tag;

pub use api::Depsgraph;
pub use builder::{BuildReport, Diagnostic};
pub use config::{DebugFlags, DepsgraphConfig, PlaceholderPolicy};
pub use error::{DepsgraphError, Result};
pub use graph::{EvaluationMode, Graph};
pub use tag::{RecalcFlags, UpdateSource};
