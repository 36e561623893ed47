use std::collections::VecDeque;

use crate::builder::context::BuildContext;
use crate::config::DebugFlags;
use crate::graph::{
    ComponentIndex, ComponentKey, Graph, IdNodeIndex, NodeType, OperationCode, OperationFlags, OperationIndex,
    OperationKey,
};
use crate::host::{IdHandle, IdKind};

use super::{RecalcFlags, UpdateSource};

fn find_component(graph: &Graph, id: IdHandle, kind: NodeType) -> Option<ComponentIndex> {
    graph.find_component(&ComponentKey::new(id, kind))
}

fn find_code(graph: &Graph, component: ComponentIndex, code: OperationCode) -> Option<OperationIndex> {
    graph
        .component(component)
        .operations()
        .find(|op| graph.operation(*op).code() == code)
}

/// Component a geometry tag lands on. Armature objects evaluate their
/// deformation in the pose.
fn geometry_component(graph: &Graph, id_node: IdNodeIndex) -> NodeType {
    let node = graph.id_node(id_node);
    if node.kind() != IdKind::Object {
        return NodeType::Geometry;
    }
    let id = node.id_orig();
    if find_component(graph, id, NodeType::Geometry).is_none() && find_component(graph, id, NodeType::Pose).is_some()
    {
        NodeType::Pose
    } else {
        NodeType::Geometry
    }
}

/// Operations a tag of `recalc` on `id` starts flushing from.
///
/// | Reason        | Seeds                                              |
/// |---------------|----------------------------------------------------|
/// | TRANSFORM     | TRANSFORM entry and TRANSFORM_FINAL                |
/// | GEOMETRY      | GEOMETRY (POSE for armatures) entry and GEOMETRY_EVAL |
/// | ANIMATION     | ANIMATION_EVAL                                     |
/// | COPY_ON_EVAL  | COPY_ON_EVAL and the entry of every component      |
/// | BASE_FLAGS    | own OBJECT_BASE_FLAGS, scene VIEW_LAYER_EVAL       |
/// | HIERARCHY     | scene HIERARCHY                                    |
/// | RELATIONS     | none, the graph is marked stale instead            |
/// | POINT_CACHE   | POINT_CACHE_RESET                                  |
/// | others        | entry of the matching component                    |
pub fn seed_operations(graph: &Graph, id: IdHandle, recalc: RecalcFlags) -> Vec<OperationIndex> {
    let mut seeds: Vec<OperationIndex> = Vec::new();
    let mut push = |op: Option<OperationIndex>| {
        if let Some(op) = op {
            if !seeds.contains(&op) {
                seeds.push(op);
            }
        }
    };

    let scene = graph.scene();
    let scene_parameters = find_component(graph, scene, NodeType::Parameters);
    let Some(id_node) = graph.find_id_node(id) else {
        // The scene-level reasons still apply to ids the graph never built
        if recalc.contains(RecalcFlags::BASE_FLAGS) {
            push(scene_parameters.and_then(|c| find_code(graph, c, OperationCode::ViewLayerEval)));
        }
        if recalc.contains(RecalcFlags::HIERARCHY) {
            push(scene_parameters.and_then(|c| find_code(graph, c, OperationCode::Hierarchy)));
        }
        return seeds;
    };

    if recalc.contains(RecalcFlags::TRANSFORM) {
        if let Some(component) = find_component(graph, id, NodeType::Transform) {
            push(graph.component_entry_operation(component));
            push(find_code(graph, component, OperationCode::TransformFinal));
        }
    }
    if recalc.contains(RecalcFlags::GEOMETRY) {
        if let Some(component) = find_component(graph, id, geometry_component(graph, id_node)) {
            push(graph.component_entry_operation(component));
            push(find_code(graph, component, OperationCode::GeometryEval));
        }
    }
    if recalc.contains(RecalcFlags::ANIMATION) {
        if let Some(component) = find_component(graph, id, NodeType::Animation) {
            push(
                find_code(graph, component, OperationCode::AnimationEval)
                    .or_else(|| graph.component_entry_operation(component)),
            );
        }
    }
    if recalc.contains(RecalcFlags::COPY_ON_EVAL) {
        if let Some(component) = find_component(graph, id, NodeType::CopyOnEval) {
            push(find_code(graph, component, OperationCode::CopyOnEval));
        }
        for component in graph.id_node(id_node).components() {
            push(graph.component_entry_operation(component));
        }
    }
    if recalc.contains(RecalcFlags::BASE_FLAGS) {
        if let Some(component) = find_component(graph, id, NodeType::Parameters) {
            push(find_code(graph, component, OperationCode::ObjectBaseFlags));
        }
        push(scene_parameters.and_then(|c| find_code(graph, c, OperationCode::ViewLayerEval)));
    }
    if recalc.contains(RecalcFlags::HIERARCHY) {
        push(scene_parameters.and_then(|c| find_code(graph, c, OperationCode::Hierarchy)));
    }
    if recalc.contains(RecalcFlags::POINT_CACHE) {
        if let Some(component) = find_component(graph, id, NodeType::PointCache) {
            push(
                find_code(graph, component, OperationCode::PointCacheReset)
                    .or_else(|| graph.component_entry_operation(component)),
            );
        }
    }
    for (flag, kind) in [
        (RecalcFlags::SHADING, NodeType::Shading),
        (RecalcFlags::PARAMETERS, NodeType::Parameters),
        (RecalcFlags::SEQUENCER, NodeType::Sequencer),
        (RecalcFlags::AUDIO, NodeType::Audio),
    ] {
        if recalc.contains(flag) {
            push(find_component(graph, id, kind).and_then(|c| graph.component_entry_operation(c)));
        }
    }

    seeds
}

/// Tag data-block `id` for re-evaluation and flush. Returns how many
/// operations became tagged.
///
/// Tagging while a build of any graph is running on this thread is a
/// programming error.
pub fn tag_id(graph: &mut Graph, id: IdHandle, recalc: RecalcFlags, source: UpdateSource) -> usize {
    debug_assert!(
        !BuildContext::is_active(),
        "data-block tagged during graph build {:?}",
        BuildContext::current()
    );

    if recalc.contains(RecalcFlags::RELATIONS) {
        graph.set_relations_stale(true);
    }
    if let Some(index) = graph.find_id_node(id) {
        graph.id_node_mut(index).recalc |= recalc - RecalcFlags::RELATIONS;
    }

    let seeds = seed_operations(graph, id, recalc);
    let tagged = tag_operations(graph, &seeds, source);
    if graph.config().debug_enabled(DebugFlags::TAG) {
        tracing::debug!(
            id = %graph.main_database().read().id_name(id),
            ?recalc,
            ?source,
            seeds = seeds.len(),
            tagged,
            "tagged data-block"
        );
    }
    tagged
}

/// Tag `seeds` directly and flush from them. Seeds that are not
/// operations of the current graph, such as indices kept across a rebuild
/// that shrank it, are ignored.
pub fn tag_operations(graph: &mut Graph, seeds: &[OperationIndex], source: UpdateSource) -> usize {
    let mut direct = OperationFlags::DIRECTLY_MODIFIED;
    if source.is_user_edit() {
        direct |= OperationFlags::USER_MODIFIED;
    }
    let count = graph.operation_count();
    for seed in seeds.iter().filter(|seed| seed.index() < count) {
        graph.operation_mut(*seed).flags.insert(direct);
    }
    flush(graph, seeds, source)
}

/// Tag the operation `key` resolves to. `None` when it does not resolve.
pub fn tag_operation(graph: &mut Graph, key: &OperationKey, source: UpdateSource) -> Option<usize> {
    let op = graph.find_operation(key)?;
    Some(tag_operations(graph, &[op], source))
}

/// Tag the scene's time source: everything time dependent is re-evaluated.
pub fn tag_time_source(graph: &mut Graph) -> usize {
    let time_source = find_component(graph, graph.scene(), NodeType::Animation)
        .and_then(|component| find_code(graph, component, OperationCode::TimeSource));
    let Some(time_source) = time_source else {
        return 0;
    };
    let tagged = tag_operations(graph, &[time_source], UpdateSource::Time);
    if graph.config().debug_enabled(DebugFlags::TIME) {
        tracing::debug!(tagged, "time source changed");
    }
    tagged
}

/// Mark `seeds` and everything reachable from them over relations that
/// propagate for `source`. Returns how many operations were newly marked.
/// Out-of-range seeds are skipped.
pub fn flush(graph: &mut Graph, seeds: &[OperationIndex], source: UpdateSource) -> usize {
    let user_edit = source.is_user_edit();
    let mut visited = vec![false; graph.operation_count()];
    let mut queue: VecDeque<OperationIndex> = VecDeque::new();
    let mut newly_marked = 0;

    for seed in seeds {
        if seed.index() >= visited.len() {
            tracing::trace!(seed = seed.index(), "skipping stale operation index");
            continue;
        }
        if !visited[seed.index()] {
            visited[seed.index()] = true;
            queue.push_back(*seed);
        }
    }

    while let Some(op) = queue.pop_front() {
        if graph.operation_mut(op).mark_needs_update() {
            newly_marked += 1;
        }
        let component = graph.operation(op).owner();
        let recalc = graph.component(component).kind().recalc_flag();
        let owner = graph.component(component).owner();
        graph.id_node_mut(owner).recalc |= recalc;

        for &relation in graph.operation(op).outlinks() {
            let relation = graph.relation(relation);
            if !relation.propagates(user_edit) {
                continue;
            }
            let to = relation.to();
            if !visited[to.index()] {
                visited[to.index()] = true;
                queue.push_back(to);
            }
        }
    }

    newly_marked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DepsgraphConfig;
    use crate::graph::{EvaluationMode, RelationFlags};
    use crate::host::{Main, MainDatabase};

    struct Fixture {
        graph: Graph,
        object: IdHandle,
    }

    fn op(graph: &mut Graph, id: IdHandle, kind: NodeType, code: OperationCode) -> OperationIndex {
        let node = graph.ensure_id_node(id, "OBA", IdKind::Object).unwrap();
        let component = graph.ensure_component(node, kind, "").unwrap();
        graph.ensure_operation(component, code, "", -1).unwrap()
    }

    fn fixture() -> Fixture {
        let graph = Graph::new(
            MainDatabase::new(Main::new()),
            IdHandle::from_raw(0),
            "ViewLayer",
            EvaluationMode::Viewport,
            DepsgraphConfig::default(),
        );
        Fixture {
            graph,
            object: IdHandle::from_raw(1),
        }
    }

    #[test]
    fn transform_tag_flushes_down_the_chain() {
        let Fixture { mut graph, object } = fixture();
        let init = op(&mut graph, object, NodeType::Transform, OperationCode::TransformInit);
        let local = op(&mut graph, object, NodeType::Transform, OperationCode::TransformLocal);
        let final_ = op(&mut graph, object, NodeType::Transform, OperationCode::TransformFinal);
        let geometry = op(&mut graph, object, NodeType::Geometry, OperationCode::GeometryEval);
        graph.add_relation(init, local, "", RelationFlags::empty()).unwrap();
        graph.add_relation(local, final_, "", RelationFlags::empty()).unwrap();
        graph.add_relation(final_, geometry, "", RelationFlags::empty()).unwrap();

        let tagged = tag_id(&mut graph, object, RecalcFlags::TRANSFORM, UpdateSource::UserEdit);

        assert_eq!(tagged, 4);
        assert!(graph.operation(geometry).needs_update());
        assert!(graph.operation(init).flags().contains(OperationFlags::DIRECTLY_MODIFIED));
        assert!(!graph.operation(geometry).flags().contains(OperationFlags::DIRECTLY_MODIFIED));
        let recalc = graph.id_node_for(object).unwrap().recalc();
        assert!(recalc.contains(RecalcFlags::TRANSFORM | RecalcFlags::GEOMETRY));
    }

    #[test]
    fn flush_respects_relation_flags() {
        let Fixture { mut graph, object } = fixture();
        let source = op(&mut graph, object, NodeType::Transform, OperationCode::TransformFinal);
        let blocked = op(&mut graph, object, NodeType::Geometry, OperationCode::GeometryEval);
        let cache = op(&mut graph, object, NodeType::PointCache, OperationCode::PointCacheReset);
        graph.add_relation(source, blocked, "", RelationFlags::NO_FLUSH).unwrap();
        graph
            .add_relation(source, cache, "", RelationFlags::FLUSH_USER_EDIT_ONLY)
            .unwrap();

        assert_eq!(flush(&mut graph, &[source], UpdateSource::Time), 1);
        assert!(!graph.operation(blocked).needs_update());
        assert!(!graph.operation(cache).needs_update());

        flush(&mut graph, &[source], UpdateSource::UserEdit);
        assert!(!graph.operation(blocked).needs_update());
        assert!(graph.operation(cache).needs_update());
    }

    #[test]
    fn flush_terminates_on_cycles() {
        let Fixture { mut graph, object } = fixture();
        let a = op(&mut graph, object, NodeType::Geometry, OperationCode::GeometryEvalInit);
        let b = op(&mut graph, object, NodeType::Geometry, OperationCode::GeometryEval);
        graph.add_relation(a, b, "", RelationFlags::empty()).unwrap();
        graph.add_relation(b, a, "", RelationFlags::CYCLIC).unwrap();

        assert_eq!(flush(&mut graph, &[b], UpdateSource::UserEdit), 2);
        assert!(graph.operation(a).needs_update());
    }

    #[test]
    fn relations_tag_only_marks_stale() {
        let Fixture { mut graph, object } = fixture();
        op(&mut graph, object, NodeType::Transform, OperationCode::TransformFinal);
        graph.set_relations_stale(false);

        let tagged = tag_id(&mut graph, object, RecalcFlags::RELATIONS, UpdateSource::UserEdit);

        assert_eq!(tagged, 0);
        assert!(graph.need_update_relations());
    }

    #[test]
    fn unknown_ids_tag_nothing() {
        let Fixture { mut graph, .. } = fixture();
        assert_eq!(
            tag_id(&mut graph, IdHandle::from_raw(42), RecalcFlags::ALL, UpdateSource::UserEdit),
            0
        );
    }

    #[test]
    fn stale_seeds_are_ignored() {
        let Fixture { mut graph, object } = fixture();
        op(&mut graph, object, NodeType::Transform, OperationCode::TransformInit);
        let stale = op(&mut graph, object, NodeType::Transform, OperationCode::TransformFinal);
        graph.clear();
        let kept = op(&mut graph, object, NodeType::Transform, OperationCode::TransformInit);

        assert_eq!(tag_operations(&mut graph, &[stale, kept], UpdateSource::UserEdit), 1);
        assert!(graph.operation(kept).needs_update());
    }
}
