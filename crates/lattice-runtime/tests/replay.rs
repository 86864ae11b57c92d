//! End-to-end capture, instantiate, replay, and update coverage.

use std::sync::Arc;

use lattice_core::error::RuntimeError;
use lattice_core::types::{Dim3, MemcpyKind, NodeKind};
use lattice_device::{Buffer, Event, Kernel};
use lattice_graph::{
    KernelParams, Memcpy1dParams, MemsetParams, SymbolCopyParams,
};
use lattice_runtime::GraphRuntime;
use parking_lot::Mutex;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn memset_params(dst: &Buffer, value: u32) -> MemsetParams {
    MemsetParams {
        dst: dst.clone(),
        offset: 0,
        value,
        element_size: 1,
        width: dst.len(),
        height: 1,
        pitch: dst.len(),
    }
}

/// A kernel that fills a captured buffer with the u32 argument, truncated
/// to bytes.
fn fill_kernel(dst: &Buffer) -> Kernel {
    let dst = dst.clone();
    Kernel::new("fill", 4, move |_, args| {
        let mut word = [0u8; 4];
        word.copy_from_slice(args);
        let value = u32::from_le_bytes(word) as u8;
        let len = dst.len();
        dst.write(0, &vec![value; len]).expect("kernel store");
    })
}

#[test]
fn test_chain_replays_deterministically() {
    init_logging();
    let rt = GraphRuntime::default();
    let device = rt.device().clone();
    let a = device.alloc(8).expect("alloc");
    let b = device.alloc(8).expect("alloc");
    let c = device.alloc(8).expect("alloc");

    let graph = rt.create_graph();
    let n1 = rt
        .add_memset_node(graph, &[], memset_params(&a, 1))
        .expect("n1");
    let n2 = rt
        .add_memset_node(graph, &[n1], memset_params(&b, 2))
        .expect("n2");
    rt.add_memset_node(graph, &[n2], memset_params(&c, 3))
        .expect("n3");

    let plan = rt.instantiate(graph).expect("instantiate");
    // A linear chain borrows the launch queue and owns nothing.
    assert_eq!(rt.plan_queue_count(plan).expect("queues"), 0);

    let stream = rt.create_stream().expect("stream");
    for _ in 0..2 {
        rt.launch(plan, &stream).expect("launch");
        rt.synchronize_plan(plan).expect("synchronize");
        assert_eq!(a.read(0, 8).expect("read a"), vec![1; 8]);
        assert_eq!(b.read(0, 8).expect("read b"), vec![2; 8]);
        assert_eq!(c.read(0, 8).expect("read c"), vec![3; 8]);
    }
}

#[test]
fn test_branch_runs_both_arms() {
    let rt = GraphRuntime::default();
    let order = Arc::new(Mutex::new(Vec::new()));
    let note = |tag: &'static str| {
        let order = Arc::clone(&order);
        Arc::new(move || order.lock().push(tag)) as Arc<dyn Fn() + Send + Sync>
    };

    let graph = rt.create_graph();
    let k1 = rt.add_host_node(graph, &[], note("k1")).expect("k1");
    rt.add_host_node(graph, &[k1], note("k2")).expect("k2");
    rt.add_host_node(graph, &[k1], note("k3")).expect("k3");

    let plan = rt.instantiate(graph).expect("instantiate");
    // Two chains: the branch arm gets one plan-owned queue.
    assert_eq!(rt.plan_queue_count(plan).expect("queues"), 1);

    let stream = rt.create_stream().expect("stream");
    rt.launch(plan, &stream).expect("launch");
    rt.synchronize_plan(plan).expect("synchronize");

    let seen = order.lock().clone();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], "k1");
    assert!(seen.contains(&"k2") && seen.contains(&"k3"));
}

#[test]
fn test_diamond_orders_join_after_both_arms() {
    let rt = GraphRuntime::default();
    let order = Arc::new(Mutex::new(Vec::new()));
    let note = |tag: &'static str| {
        let order = Arc::clone(&order);
        Arc::new(move || order.lock().push(tag)) as Arc<dyn Fn() + Send + Sync>
    };

    let graph = rt.create_graph();
    let a = rt.add_host_node(graph, &[], note("a")).expect("a");
    let b = rt.add_host_node(graph, &[a], note("b")).expect("b");
    let c = rt.add_host_node(graph, &[a], note("c")).expect("c");
    rt.add_host_node(graph, &[b, c], note("d")).expect("d");

    let plan = rt.instantiate(graph).expect("instantiate");
    let stream = rt.create_stream().expect("stream");
    for _ in 0..4 {
        rt.launch(plan, &stream).expect("launch");
    }
    rt.synchronize_plan(plan).expect("synchronize");

    let seen = order.lock().clone();
    assert_eq!(seen.len(), 16);
    for replay in seen.chunks(4) {
        assert_eq!(replay[0], "a");
        assert_eq!(replay[3], "d");
    }
}

#[test]
fn test_memcpy_kernel_pipeline() {
    let rt = GraphRuntime::default();
    let device = rt.device().clone();
    let input = Buffer::host(4);
    input.write(0, &7u32.to_le_bytes()).expect("seed input");
    let staged = device.alloc(4).expect("alloc");
    let result = device.alloc(16).expect("alloc");
    let readback = Buffer::host(16);

    let graph = rt.create_graph();
    let upload = rt
        .add_memcpy_1d_node(
            graph,
            &[],
            Memcpy1dParams {
                dst: staged.clone(),
                dst_offset: 0,
                src: input.clone(),
                src_offset: 0,
                count: 4,
                kind: MemcpyKind::HostToDevice,
            },
        )
        .expect("upload");
    let launch = rt
        .add_kernel_node(
            graph,
            &[upload],
            KernelParams {
                kernel: fill_kernel(&result),
                grid: Dim3::new(4, 1, 1),
                block: Dim3::new(4, 1, 1),
                shared_mem_bytes: 0,
                args: 7u32.to_le_bytes().to_vec(),
            },
        )
        .expect("kernel");
    rt.add_memcpy_1d_node(
        graph,
        &[launch],
        Memcpy1dParams {
            dst: readback.clone(),
            dst_offset: 0,
            src: result.clone(),
            src_offset: 0,
            count: 16,
            kind: MemcpyKind::DeviceToHost,
        },
    )
    .expect("download");

    let plan = rt.instantiate(graph).expect("instantiate");
    let stream = rt.create_stream().expect("stream");
    rt.launch(plan, &stream).expect("launch");
    rt.synchronize_plan(plan).expect("synchronize");
    assert_eq!(readback.read(0, 16).expect("read"), vec![7; 16]);
}

#[test]
fn test_symbol_copy_roundtrip() {
    let rt = GraphRuntime::default();
    rt.device().register_symbol("bias", 8).expect("register");
    let source = Buffer::host(8);
    source.write(0, &[5; 8]).expect("seed");
    let sink = Buffer::host(8);

    let graph = rt.create_graph();
    let upload = rt
        .add_memcpy_to_symbol_node(
            graph,
            &[],
            SymbolCopyParams {
                symbol: "bias".to_string(),
                symbol_offset: 0,
                other: source,
                other_offset: 0,
                count: 8,
                kind: MemcpyKind::HostToDevice,
            },
        )
        .expect("to symbol");
    rt.add_memcpy_from_symbol_node(
        graph,
        &[upload],
        SymbolCopyParams {
            symbol: "bias".to_string(),
            symbol_offset: 0,
            other: sink.clone(),
            other_offset: 0,
            count: 8,
            kind: MemcpyKind::DeviceToHost,
        },
    )
    .expect("from symbol");

    let plan = rt.instantiate(graph).expect("instantiate");
    let stream = rt.create_stream().expect("stream");
    rt.launch(plan, &stream).expect("launch");
    rt.synchronize_plan(plan).expect("synchronize");
    assert_eq!(sink.read(0, 8).expect("read"), vec![5; 8]);
}

#[test]
fn test_child_graph_replays_as_one_unit() {
    let rt = GraphRuntime::default();
    let device = rt.device().clone();
    let inner_dst = device.alloc(8).expect("alloc");
    let outer_dst = device.alloc(8).expect("alloc");

    let child = rt.create_graph();
    rt.add_memset_node(child, &[], memset_params(&inner_dst, 9))
        .expect("inner memset");

    let parent = rt.create_graph();
    let nested = rt
        .add_child_graph_node(parent, &[], child)
        .expect("child node");
    assert_eq!(
        rt.node_kind(nested).expect("kind"),
        NodeKind::ChildGraph
    );
    rt.add_memset_node(parent, &[nested], memset_params(&outer_dst, 4))
        .expect("outer memset");

    // The child was cloned at insertion; destroying the original is fine.
    rt.destroy_graph(child).expect("destroy child");

    let plan = rt.instantiate(parent).expect("instantiate");
    let stream = rt.create_stream().expect("stream");
    rt.launch(plan, &stream).expect("launch");
    rt.synchronize_plan(plan).expect("synchronize");
    assert_eq!(inner_dst.read(0, 8).expect("read"), vec![9; 8]);
    assert_eq!(outer_dst.read(0, 8).expect("read"), vec![4; 8]);
}

#[test]
fn test_branching_child_graph_orders_across_chains() {
    let rt = GraphRuntime::default();
    let order = Arc::new(Mutex::new(Vec::new()));
    let note = |tag: &'static str| {
        let order = Arc::clone(&order);
        Arc::new(move || order.lock().push(tag)) as Arc<dyn Fn() + Send + Sync>
    };

    // The child branches internally, so it brings its own queue demand.
    let child = rt.create_graph();
    let root = rt.add_host_node(child, &[], note("root")).expect("root");
    rt.add_host_node(child, &[root], note("left")).expect("left");
    rt.add_host_node(child, &[root], note("right")).expect("right");

    let parent = rt.create_graph();
    let before = rt.add_host_node(parent, &[], note("before")).expect("before");
    let nested = rt
        .add_child_graph_node(parent, &[before], child)
        .expect("child node");
    rt.add_host_node(parent, &[nested], note("after")).expect("after");
    rt.add_host_node(parent, &[before], note("aside")).expect("aside");

    let plan = rt.instantiate(parent).expect("instantiate");
    // One queue for the parent's side branch, one for the child's.
    assert_eq!(rt.plan_queue_count(plan).expect("queues"), 2);

    let stream = rt.create_stream().expect("stream");
    for _ in 0..2 {
        rt.launch(plan, &stream).expect("launch");
        rt.synchronize_plan(plan).expect("synchronize");
    }

    let seen = order.lock().clone();
    assert_eq!(seen.len(), 12);
    for replay in seen.chunks(6) {
        let at = |tag| {
            replay
                .iter()
                .position(|&t| t == tag)
                .unwrap_or_else(|| panic!("missing {tag}"))
        };
        assert_eq!(at("before"), 0);
        assert!(at("root") > at("before"));
        assert!(at("left") > at("root"));
        assert!(at("right") > at("root"));
        assert!(at("after") > at("left"));
        assert!(at("after") > at("right"));
    }
}

#[test]
fn test_wait_ahead_of_record_does_not_stall() {
    let rt = GraphRuntime::default();
    let event = Event::new();

    // A wait submitted before any record of its event is a no-op rather
    // than a stall of the whole queue.
    let graph = rt.create_graph();
    let start = rt.add_empty_node(graph, &[]).expect("start");
    let wait = rt
        .add_event_wait_node(graph, &[start], event.clone())
        .expect("wait");
    rt.add_event_record_node(graph, &[wait], event.clone())
        .expect("record");

    let plan = rt.instantiate(graph).expect("instantiate");
    let stream = rt.create_stream().expect("stream");
    for _ in 0..2 {
        rt.launch(plan, &stream).expect("launch");
        rt.synchronize_plan(plan).expect("synchronize");
    }
    assert!(event.is_recorded());
}

#[test]
fn test_event_record_observed_by_wait_and_host() {
    let rt = GraphRuntime::default();
    let event = Event::new();

    let graph = rt.create_graph();
    let record = rt
        .add_event_record_node(graph, &[], event.clone())
        .expect("record");
    rt.add_event_wait_node(graph, &[record], event.clone())
        .expect("wait");

    let plan = rt.instantiate(graph).expect("instantiate");
    let stream = rt.create_stream().expect("stream");
    rt.launch(plan, &stream).expect("launch");
    event.synchronize();
    rt.synchronize_plan(plan).expect("synchronize");
    assert!(event.is_recorded());
    assert!(event.query());
}

#[test]
fn test_update_swaps_parameters_in_place() {
    let rt = GraphRuntime::default();
    let device = rt.device().clone();
    let dst = device.alloc(8).expect("alloc");

    let graph = rt.create_graph();
    rt.add_memset_node(graph, &[], memset_params(&dst, 1))
        .expect("memset");
    let plan = rt.instantiate(graph).expect("instantiate");

    let replacement = rt.create_graph();
    rt.add_memset_node(replacement, &[], memset_params(&dst, 2))
        .expect("replacement memset");
    rt.update_plan(plan, replacement).expect("update");
    assert_eq!(rt.plan_update_count(plan).expect("count"), 1);

    let stream = rt.create_stream().expect("stream");
    rt.launch(plan, &stream).expect("launch");
    rt.synchronize_plan(plan).expect("synchronize");
    assert_eq!(dst.read(0, 8).expect("read"), vec![2; 8]);
}

#[test]
fn test_update_mismatch_leaves_plan_untouched() {
    let rt = GraphRuntime::default();
    let device = rt.device().clone();
    let dst = device.alloc(8).expect("alloc");

    let graph = rt.create_graph();
    rt.add_memset_node(graph, &[], memset_params(&dst, 1))
        .expect("memset");
    let plan = rt.instantiate(graph).expect("instantiate");

    // Wrong kind at position 0.
    let wrong_kind = rt.create_graph();
    rt.add_empty_node(wrong_kind, &[]).expect("empty");
    assert!(matches!(
        rt.update_plan(plan, wrong_kind),
        Err(RuntimeError::TopologyMismatch(_))
    ));

    // Matching shape but invalid parameters.
    let invalid = rt.create_graph();
    let mut params = memset_params(&dst, 3);
    params.element_size = 3;
    rt.add_memset_node(invalid, &[], params).expect("memset");
    assert!(rt.update_plan(plan, invalid).is_err());
    assert_eq!(rt.plan_update_count(plan).expect("count"), 0);

    // The plan still runs with its original parameters.
    let stream = rt.create_stream().expect("stream");
    rt.launch(plan, &stream).expect("launch");
    rt.synchronize_plan(plan).expect("synchronize");
    assert_eq!(dst.read(0, 8).expect("read"), vec![1; 8]);
}

#[test]
fn test_instantiate_rejects_bad_kernel_geometry() {
    let rt = GraphRuntime::default();
    let dst = rt.device().alloc(4).expect("alloc");

    let graph = rt.create_graph();
    rt.add_kernel_node(
        graph,
        &[],
        KernelParams {
            kernel: fill_kernel(&dst),
            grid: Dim3::new(1, 1, 1),
            block: Dim3::new(64, 64, 1),
            shared_mem_bytes: 0,
            args: vec![0; 4],
        },
    )
    .expect("kernel node");

    let err = rt.instantiate(graph).expect_err("oversized block");
    assert!(matches!(err, RuntimeError::InvalidLaunchGeometry(_)));
}

#[test]
fn test_handles_go_stale_on_destroy() {
    let rt = GraphRuntime::default();
    let graph = rt.create_graph();
    let node = rt.add_empty_node(graph, &[]).expect("node");
    assert!(rt.is_graph_valid(graph));
    assert!(rt.is_node_valid(node));

    let plan = rt.instantiate(graph).expect("instantiate");
    assert!(rt.is_plan_valid(plan));

    rt.destroy_graph(graph).expect("destroy graph");
    assert!(!rt.is_graph_valid(graph));
    assert!(!rt.is_node_valid(node));
    assert!(matches!(
        rt.graph_node_count(graph),
        Err(RuntimeError::InvalidHandle { kind: "graph" })
    ));

    // The plan owns its own clone and keeps working.
    let stream = rt.create_stream().expect("stream");
    rt.launch(plan, &stream).expect("launch");
    rt.synchronize_plan(plan).expect("synchronize");

    rt.destroy_plan(plan).expect("destroy plan");
    assert!(!rt.is_plan_valid(plan));
    assert!(rt.launch(plan, &stream).is_err());

    // A new graph may reuse the slot; the old handle stays dead.
    let fresh = rt.create_graph();
    assert!(rt.is_graph_valid(fresh));
    assert!(!rt.is_graph_valid(graph));
}

#[test]
fn test_pitched_memset_fills_rows_only() {
    let rt = GraphRuntime::default();
    let dst = rt.device().alloc(32).expect("alloc");

    let graph = rt.create_graph();
    rt.add_memset_node(
        graph,
        &[],
        MemsetParams {
            dst: dst.clone(),
            offset: 0,
            value: 0xBEEF,
            element_size: 2,
            width: 3,
            height: 2,
            pitch: 16,
        },
    )
    .expect("memset");

    let plan = rt.instantiate(graph).expect("instantiate");
    let stream = rt.create_stream().expect("stream");
    rt.launch(plan, &stream).expect("launch");
    rt.synchronize_plan(plan).expect("synchronize");

    let pattern = vec![0xEF, 0xBE, 0xEF, 0xBE, 0xEF, 0xBE];
    assert_eq!(dst.read(0, 6).expect("row 0"), pattern);
    assert_eq!(dst.read(6, 2).expect("gap"), vec![0, 0]);
    assert_eq!(dst.read(16, 6).expect("row 1"), pattern);
}

#[test]
fn test_structural_queries() {
    let rt = GraphRuntime::default();
    let graph = rt.create_graph();
    let a = rt.add_empty_node(graph, &[]).expect("a");
    let b = rt.add_empty_node(graph, &[a]).expect("b");
    let c = rt.add_empty_node(graph, &[a]).expect("c");

    assert_eq!(rt.graph_node_count(graph).expect("count"), 3);
    assert_eq!(rt.graph_edge_count(graph).expect("edges"), 2);
    assert_eq!(rt.graph_root_nodes(graph).expect("roots"), vec![a]);
    assert_eq!(rt.graph_leaf_nodes(graph).expect("leaves"), vec![b, c]);
    assert_eq!(rt.node_level(b).expect("level"), 1);
    assert_eq!(rt.node_dependencies(b).expect("deps"), vec![a]);
    assert_eq!(rt.node_dependents(a).expect("dependents"), vec![b, c]);

    assert_eq!(rt.graph_nodes(graph).expect("nodes"), vec![a, b, c]);
    assert_eq!(rt.graph_edges(graph).expect("edges"), vec![(a, b), (a, c)]);

    rt.remove_dependency(a, c).expect("remove edge");
    assert_eq!(rt.graph_root_nodes(graph).expect("roots"), vec![a, c]);
    assert_eq!(rt.node_level(c).expect("level"), 0);

    rt.destroy_node(c).expect("destroy node");
    assert!(!rt.is_node_valid(c));
    assert_eq!(rt.graph_node_count(graph).expect("count"), 2);

    let dot = rt.graph_to_dot(graph).expect("dot");
    assert!(dot.contains("EMPTY"));
}

#[test]
fn test_cloned_graph_is_independent() {
    let rt = GraphRuntime::default();
    let graph = rt.create_graph();
    let a = rt.add_empty_node(graph, &[]).expect("a");
    rt.add_empty_node(graph, &[a]).expect("b");

    let copy = rt.clone_graph(graph).expect("clone");
    assert_eq!(rt.graph_node_count(copy).expect("count"), 2);
    rt.add_empty_node(graph, &[a]).expect("extend original");
    assert_eq!(rt.graph_node_count(graph).expect("count"), 3);
    assert_eq!(rt.graph_node_count(copy).expect("count"), 2);
}
