// Render graph behavior against the CPU-only backend

use vkscene::error::GraphError;
use vkscene::graph::headless::{CommandLog, HeadlessBackend};
use vkscene::graph::RenderGraph;
use vkscene::logging::CaptureSink;
use vkscene::resource::{BufferInfo, BufferUsage, TextureFormat, TextureInfo, TextureUsage};

fn info() -> TextureInfo {
    TextureInfo::attachment(TextureFormat::Rgba8Unorm, 4, 4).with_usage(TextureUsage::SAMPLED)
}

fn graph() -> RenderGraph<HeadlessBackend> {
    let mut graph = RenderGraph::new(HeadlessBackend::default());
    graph.set_default_texture_info(Some(info()));
    graph.reset();
    graph
}

/// Declare A (writes x), B (reads x, writes y) and C (reads y) in `order`
fn declare_chain(graph: &mut RenderGraph<HeadlessBackend>, order: [&str; 3]) {
    for name in order {
        let pass = graph.add_render_pass(name).unwrap();
        match name {
            "A" => pass.write_color("x"),
            "B" => pass.read_texture("x").write_color("y"),
            "C" => pass.read_texture("y"),
            other => panic!("unknown pass {other}"),
        }
        .execute(|ctx| {
            let line = format!("run {}", ctx.pass_name());
            ctx.cmd.push(line);
            Ok(())
        });
    }
}

#[test]
fn writers_run_before_readers_in_any_declaration_order() {
    let permutations = [
        ["A", "B", "C"],
        ["A", "C", "B"],
        ["B", "A", "C"],
        ["B", "C", "A"],
        ["C", "A", "B"],
        ["C", "B", "A"],
    ];
    for order in permutations {
        let mut graph = graph();
        declare_chain(&mut graph, order);
        graph.compile().unwrap();
        assert_eq!(graph.order(), vec!["A", "B", "C"], "declared as {order:?}");

        let mut log = CommandLog::default();
        graph.execute(&mut log).unwrap();
        let a = log.position("run A").unwrap();
        let b = log.position("run B").unwrap();
        let c = log.position("run C").unwrap();
        assert!(a < b && b < c);
    }
}

#[test]
fn same_name_is_the_same_texture() {
    let mut graph = graph();
    let first = graph.get_render_texture("color").unwrap();
    let second = graph.get_render_texture("color").unwrap();
    assert_eq!(first, second);

    graph.texture_mut(first).unwrap().bytes[..4].copy_from_slice(&[1, 2, 3, 4]);
    assert_eq!(&graph.texture(second).unwrap().bytes[..4], &[1, 2, 3, 4]);
    assert_eq!(graph.backend().textures_created, 1);
}

#[test]
fn passes_share_a_texture_by_name() {
    let mut graph = graph();
    graph
        .add_render_pass("fill")
        .unwrap()
        .write_color("shared")
        .execute(|ctx| {
            ctx.texture_mut("shared")?.bytes.fill(9);
            Ok(())
        });
    graph
        .add_render_pass("check")
        .unwrap()
        .read_texture("shared")
        .execute(|ctx| {
            let bytes = &ctx.texture("shared")?.bytes;
            anyhow::ensure!(bytes.iter().all(|&b| b == 9), "fill pass output not visible");
            Ok(())
        });
    graph.compile().unwrap();
    graph.execute(&mut CommandLog::default()).unwrap();
}

#[test]
fn compiling_twice_gives_the_same_order() {
    let capture = CaptureSink::new();
    let mut graph = RenderGraph::with_log_sink(HeadlessBackend::default(), capture.clone());
    graph.set_default_texture_info(Some(info()));
    graph.reset();
    declare_chain(&mut graph, ["C", "B", "A"]);

    graph.compile().unwrap();
    let first: Vec<String> = graph.order().iter().map(|s| s.to_string()).collect();
    graph.compile().unwrap();
    let second: Vec<String> = graph.order().iter().map(|s| s.to_string()).collect();
    assert_eq!(first, second);
    assert!(capture.contains("reusing pass order"));
}

#[test]
fn duplicate_pass_is_an_error() {
    let mut graph = graph();
    graph.add_render_pass("shadow").unwrap().write_color("x");
    assert!(matches!(
        graph.add_render_pass("shadow"),
        Err(GraphError::DuplicatePass(name)) if name == "shadow"
    ));
}

#[test]
fn reading_an_unwritten_texture_fails_compile() {
    let mut graph = graph();
    graph.add_render_pass("post").unwrap().read_texture("never_written");
    match graph.compile() {
        Err(GraphError::ReadBeforeWrite { pass, resource }) => {
            assert_eq!(pass, "post");
            assert_eq!(resource, "never_written");
        }
        other => panic!("expected ReadBeforeWrite, got {other:?}"),
    }
}

#[test]
fn mutual_dependencies_are_a_cycle() {
    let mut graph = graph();
    graph.add_render_pass("ping").unwrap().read_texture("b").write_color("a");
    graph.add_render_pass("pong").unwrap().read_texture("a").write_color("b");
    assert!(matches!(graph.compile(), Err(GraphError::Cycle(passes)) if passes.len() == 2));
}

#[test]
fn shared_writers_do_not_force_an_order() {
    let mut graph = graph();
    graph
        .get_render_buffer_with("gbuffer", BufferInfo::new(16, BufferUsage::STORAGE))
        .unwrap();
    graph
        .add_render_pass("lighting")
        .unwrap()
        .read_buffer("gbuffer")
        .write_color("hdr");
    graph
        .add_render_pass("geometry")
        .unwrap()
        .write_buffer("gbuffer")
        .write_color("hdr");
    graph.compile().unwrap();
    assert_eq!(graph.order(), vec!["geometry", "lighting"]);
}
