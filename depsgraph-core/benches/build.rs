//! Benchmark for graph construction and tagging
//!
//! Measures:
//! - Full view layer build
//! - Flushing a transform edit through a parent chain
//! - Scaling with object count

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use depsgraph_core::api::{self, Depsgraph};
use depsgraph_core::host::{Collection, IdHandle, Main, MainDatabase, Mesh, Modifier, Object, ObjectType, Scene};
use depsgraph_core::{EvaluationMode, RecalcFlags, UpdateSource};

/// A scene of `count` mesh objects in chains of eight parents, each with a
/// shrinkwrap onto its neighbour.
fn generate_scene(count: usize) -> (Main, IdHandle, IdHandle) {
    let mut main = Main::new();
    let mut objects = Vec::with_capacity(count);
    for i in 0..count {
        let mesh = main.add_mesh(format!("Mesh{i}"), Mesh::default());
        let mut object = Object::new(ObjectType::Mesh).with_data(mesh);
        if i % 8 != 0 {
            object = object.with_parent(objects[i - 1]);
        }
        if i > 0 {
            object = object.with_modifier(Modifier::Shrinkwrap {
                target: Some(objects[i - 1]),
            });
        }
        objects.push(main.add_object(format!("Object{i}"), object));
    }
    let first = objects[0];
    let master = main.add_collection("Master", Collection::with_objects(objects));
    let scene = main.add_scene("Scene", Scene::new(master));
    (main, scene, first)
}

fn graph_for(count: usize) -> (Depsgraph, IdHandle) {
    let (main, scene, first) = generate_scene(count);
    let database = MainDatabase::new(main);
    let graph = api::graph_new(&database, scene, "ViewLayer", EvaluationMode::Viewport).unwrap();
    (graph, first)
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_view_layer");
    for count in [64, 512, 2048] {
        let (graph, _) = graph_for(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &graph, |b, graph| {
            b.iter(|| black_box(api::graph_build_view_layer(graph).unwrap()));
        });
    }
    group.finish();
}

fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("tag_transform");
    for count in [64, 512, 2048] {
        let (graph, first) = graph_for(count);
        api::graph_build_view_layer(&graph).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(count), &graph, |b, graph| {
            b.iter(|| {
                api::graph_evaluate(graph).unwrap();
                black_box(api::graph_id_tag_update(
                    graph,
                    first,
                    RecalcFlags::TRANSFORM,
                    UpdateSource::UserEdit,
                ))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build, bench_flush);
criterion_main!(benches);
