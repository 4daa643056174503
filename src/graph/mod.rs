// =============================================================================
// RENDER GRAPH - Named resources + passes, compiled into a dependency order
// =============================================================================
//
// A frame is described, not recorded: passes declare which named textures and
// buffers they read and write, `compile` derives an execution order and the
// layout each texture needs before each pass, and `execute` records it.
//
// Lifecycle: Idle -> reset() -> Building -> compile() -> Compiled
//            -> execute() -> Executed. `reset` starts the next frame.
//
// Resources live in slots keyed by name and survive `reset`, so a name used
// every frame keeps its GPU resource. Imported textures (the swapchain image)
// are dropped on `reset` and must be imported again.

pub mod backend;
mod compile;
pub mod headless;
mod pass;
mod registry;

use std::fmt;

pub use backend::RenderBackend;
pub use pass::{BufferAccess, PassBuilder, PassContext, PassFn, TextureAccess};
pub use registry::{BufferId, ResourceKey, TextureId};

use compile::Footprint;
use pass::{PassDecl, ResolvedFootprint};
use registry::Registry;

use crate::error::GraphError;
use crate::logging::{null_sink, SharedSink};
use crate::resource::{BufferInfo, ImageLayout, TextureInfo};

const LOG_TARGET: &str = "vkscene::graph";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Idle,
    Building,
    Compiled,
    Executed,
}

impl fmt::Display for GraphState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Building => "building",
            Self::Compiled => "compiled",
            Self::Executed => "executed",
        })
    }
}

/// Everything the execution order depends on
#[derive(Debug, Clone, PartialEq, Eq)]
struct Signature {
    passes: Vec<(String, ResolvedFootprint)>,
    imports: Vec<TextureId>,
}

struct CompiledPlan {
    /// Pass indices in execution order
    order: Vec<usize>,
    /// Layouts required before each entry of `order`
    transitions: Vec<Vec<(TextureId, ImageLayout)>>,
    final_transitions: Vec<(TextureId, ImageLayout)>,
}

pub struct RenderGraph<B: RenderBackend> {
    backend: B,
    registry: Registry<B>,
    passes: Vec<PassDecl<B>>,
    plan: Option<CompiledPlan>,
    cache: Option<(Signature, Vec<usize>)>,
    state: GraphState,
    default_texture_info: Option<TextureInfo>,
    log: SharedSink,
}

impl<B: RenderBackend> RenderGraph<B> {
    pub fn new(backend: B) -> Self {
        Self::with_log_sink(backend, null_sink())
    }

    pub fn with_log_sink(backend: B, log: SharedSink) -> Self {
        Self {
            backend,
            registry: Registry::new(),
            passes: Vec::new(),
            plan: None,
            cache: None,
            state: GraphState::Idle,
            default_texture_info: None,
            log,
        }
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Description used for textures first named without one
    pub fn set_default_texture_info(&mut self, info: Option<TextureInfo>) {
        self.default_texture_info = info;
    }

    fn expect_state(&self, op: &'static str, allowed: &[GraphState]) -> Result<(), GraphError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(GraphError::InvalidState { op, state: self.state })
        }
    }

    fn backend_error(name: &str, err: B::Error) -> GraphError {
        GraphError::Backend {
            name: name.to_string(),
            source: Box::new(err),
        }
    }

    // -------------------------------------------------------------------------
    // Resources
    // -------------------------------------------------------------------------

    /// Look up or declare the texture called `name`. Every call with the same
    /// name returns the same id and therefore the same underlying texture.
    pub fn get_render_texture(&mut self, name: &str) -> Result<TextureId, GraphError> {
        match self.registry.get(name) {
            Some(ResourceKey::Texture(id)) => Ok(id),
            Some(ResourceKey::Buffer(_)) => Err(GraphError::ResourceKindMismatch(name.to_string())),
            None => match self.default_texture_info {
                Some(info) => self.get_render_texture_with(name, info),
                None => Ok(self.registry.declare_texture(name)),
            },
        }
    }

    /// Like [`get_render_texture`](Self::get_render_texture), creating the
    /// texture from `info` if it does not exist yet
    pub fn get_render_texture_with(&mut self, name: &str, info: TextureInfo) -> Result<TextureId, GraphError> {
        let id = match self.registry.get(name) {
            Some(ResourceKey::Texture(id)) => id,
            Some(ResourceKey::Buffer(_)) => return Err(GraphError::ResourceKindMismatch(name.to_string())),
            None => self.registry.declare_texture(name),
        };

        let slot = &mut self.registry.textures[id];
        match slot.info {
            Some(existing) if existing != info => {
                return Err(GraphError::ResourceInfoMismatch(name.to_string()));
            }
            Some(_) => {}
            None => slot.info = Some(info),
        }

        if slot.resource.is_none() && !slot.imported {
            let texture = self
                .backend
                .create_texture(name, &info)
                .map_err(|e| Self::backend_error(name, e))?;
            slot.resource = Some(texture);
            self.log.debug(
                LOG_TARGET,
                format_args!(
                    "created texture '{}' {}x{} {:?} x{}",
                    name, info.width, info.height, info.format, info.samples
                ),
            );
        }
        Ok(id)
    }

    pub fn get_render_buffer(&mut self, name: &str) -> Result<BufferId, GraphError> {
        match self.registry.get(name) {
            Some(ResourceKey::Buffer(id)) => Ok(id),
            Some(ResourceKey::Texture(_)) => Err(GraphError::ResourceKindMismatch(name.to_string())),
            None => Ok(self.registry.declare_buffer(name)),
        }
    }

    pub fn get_render_buffer_with(&mut self, name: &str, info: BufferInfo) -> Result<BufferId, GraphError> {
        let id = match self.registry.get(name) {
            Some(ResourceKey::Buffer(id)) => id,
            Some(ResourceKey::Texture(_)) => return Err(GraphError::ResourceKindMismatch(name.to_string())),
            None => self.registry.declare_buffer(name),
        };

        let slot = &mut self.registry.buffers[id];
        match slot.info {
            Some(existing) if existing != info => {
                return Err(GraphError::ResourceInfoMismatch(name.to_string()));
            }
            Some(_) => {}
            None => slot.info = Some(info),
        }

        if slot.resource.is_none() {
            let buffer = self
                .backend
                .create_buffer(name, &info)
                .map_err(|e| Self::backend_error(name, e))?;
            slot.resource = Some(buffer);
            self.log
                .debug(LOG_TARGET, format_args!("created buffer '{}' ({} bytes)", name, info.size));
        }
        Ok(id)
    }

    /// Hand an externally owned texture to the graph for the current frame.
    /// `layout` is its layout right now; `final_layout`, if any, is recorded
    /// after the last pass.
    pub fn import_texture(
        &mut self,
        name: &str,
        texture: B::Texture,
        info: TextureInfo,
        layout: ImageLayout,
        final_layout: Option<ImageLayout>,
    ) -> Result<TextureId, GraphError> {
        self.expect_state("import a texture", &[GraphState::Building])?;

        let id = match self.registry.get(name) {
            Some(ResourceKey::Texture(id))
                if self.registry.textures[id].imported || self.registry.textures[id].resource.is_none() =>
            {
                id
            }
            Some(_) => return Err(GraphError::ResourceKindMismatch(name.to_string())),
            None => self.registry.declare_texture(name),
        };

        let slot = &mut self.registry.textures[id];
        slot.imported = true;
        slot.info = Some(info);
        slot.resource = Some(texture);
        slot.layout = layout;
        slot.final_layout = final_layout;
        Ok(id)
    }

    /// Drop every resource and forget all names, e.g. after a resize
    pub fn release_resources(&mut self) {
        let count = self.registry.textures.len() + self.registry.buffers.len();
        self.registry.clear();
        self.passes.clear();
        self.plan = None;
        self.cache = None;
        self.state = GraphState::Idle;
        self.log
            .info(LOG_TARGET, format_args!("released {} graph resources", count));
    }

    pub fn texture_id(&self, name: &str) -> Option<TextureId> {
        match self.registry.get(name) {
            Some(ResourceKey::Texture(id)) => Some(id),
            _ => None,
        }
    }

    pub fn buffer_id(&self, name: &str) -> Option<BufferId> {
        match self.registry.get(name) {
            Some(ResourceKey::Buffer(id)) => Some(id),
            _ => None,
        }
    }

    pub fn texture(&self, id: TextureId) -> Option<&B::Texture> {
        self.registry.textures.get(id)?.resource.as_ref()
    }

    pub fn texture_mut(&mut self, id: TextureId) -> Option<&mut B::Texture> {
        self.registry.textures.get_mut(id)?.resource.as_mut()
    }

    pub fn texture_info(&self, id: TextureId) -> Option<TextureInfo> {
        self.registry.textures.get(id)?.info
    }

    /// Layout of the texture as of the last recorded command
    pub fn texture_layout(&self, id: TextureId) -> Option<ImageLayout> {
        self.registry.textures.get(id).map(|slot| slot.layout)
    }

    pub fn buffer(&self, id: BufferId) -> Option<&B::Buffer> {
        self.registry.buffers.get(id)?.resource.as_ref()
    }

    pub fn buffer_mut(&mut self, id: BufferId) -> Option<&mut B::Buffer> {
        self.registry.buffers.get_mut(id)?.resource.as_mut()
    }

    // -------------------------------------------------------------------------
    // Passes and lifecycle
    // -------------------------------------------------------------------------

    /// Start describing a new frame
    pub fn reset(&mut self) {
        self.passes.clear();
        self.plan = None;
        for slot in self.registry.textures.values_mut() {
            if slot.imported {
                slot.resource = None;
            }
        }
        self.state = GraphState::Building;
    }

    pub fn add_render_pass(&mut self, name: &str) -> Result<PassBuilder<'_, B>, GraphError> {
        self.expect_state("add a render pass", &[GraphState::Building])?;
        if self.passes.iter().any(|p| p.name == name) {
            return Err(GraphError::DuplicatePass(name.to_string()));
        }
        let index = self.passes.len();
        self.passes.push(PassDecl::new(name));
        Ok(PassBuilder::new(&mut self.passes[index]))
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Pass names in execution order; empty until compiled
    pub fn order(&self) -> Vec<&str> {
        self.plan
            .as_ref()
            .map(|plan| plan.order.iter().map(|&i| self.passes[i].name.as_str()).collect())
            .unwrap_or_default()
    }

    /// Layouts the compiled plan puts textures in before `pass` runs
    pub fn transitions_before(&self, pass: &str) -> Option<Vec<(String, ImageLayout)>> {
        let plan = self.plan.as_ref()?;
        let position = plan.order.iter().position(|&i| self.passes[i].name == pass)?;
        Some(
            plan.transitions[position]
                .iter()
                .map(|&(id, layout)| (self.registry.textures[id].name.clone(), layout))
                .collect(),
        )
    }

    pub fn compile(&mut self) -> Result<(), GraphError> {
        self.expect_state(
            "compile",
            &[GraphState::Building, GraphState::Compiled, GraphState::Executed],
        )?;
        self.plan = None;
        self.state = GraphState::Building;

        self.resolve_footprints()?;
        self.validate()?;

        let signature = self.signature();
        let cached = match &self.cache {
            Some((cached, order)) if *cached == signature => Some(order.clone()),
            _ => None,
        };
        let order = match cached {
            Some(order) => {
                self.log
                    .debug(LOG_TARGET, format_args!("topology unchanged, reusing pass order"));
                order
            }
            None => {
                let names: Vec<&str> = self.passes.iter().map(|p| p.name.as_str()).collect();
                let footprints: Vec<Footprint> = self.passes.iter().map(|p| footprint_of(&p.resolved)).collect();
                let registry = &self.registry;
                let order = compile::schedule(
                    &names,
                    &footprints,
                    |key| registry.is_imported(key),
                    |key| registry.name_of(key),
                )?;
                self.cache = Some((signature, order.clone()));
                order
            }
        };

        // Nothing is allocated for a graph that cannot run
        self.materialize()?;
        let plan = self.plan_transitions(order);
        self.plan = Some(plan);
        self.state = GraphState::Compiled;
        self.log.debug(
            LOG_TARGET,
            format_args!("compiled {} passes: {}", self.passes.len(), self.order().join(" -> ")),
        );
        Ok(())
    }

    /// Record every pass into `cmd`. Running it again re-records the same
    /// sequence, starting from the layouts the previous run left behind.
    pub fn execute(&mut self, cmd: &mut B::CommandContext) -> Result<(), GraphError> {
        let Self {
            backend,
            registry,
            passes,
            plan,
            state,
            log,
            ..
        } = self;

        let plan = match (plan.as_ref(), *state) {
            (Some(plan), GraphState::Compiled | GraphState::Executed) => plan,
            _ => return Err(GraphError::InvalidState { op: "execute", state: *state }),
        };

        for (position, &index) in plan.order.iter().enumerate() {
            for &(id, layout) in &plan.transitions[position] {
                record_transition(backend, cmd, registry, id, layout);
            }

            let pass = &mut passes[index];
            if let Some(record) = pass.execute.as_mut() {
                let mut ctx = PassContext {
                    cmd: &mut *cmd,
                    pass: &pass.name,
                    footprint: &pass.resolved,
                    registry: &mut *registry,
                };
                record(&mut ctx).map_err(|source| GraphError::PassFailed {
                    pass: pass.name.clone(),
                    source,
                })?;
            }
        }

        for &(id, layout) in &plan.final_transitions {
            record_transition(backend, cmd, registry, id, layout);
        }

        log.debug(LOG_TARGET, format_args!("executed {} passes", plan.order.len()));
        *state = GraphState::Executed;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Compilation steps
    // -------------------------------------------------------------------------

    /// Turn the names of every pass into slot keys, declaring names that were
    /// only ever mentioned by passes
    fn resolve_footprints(&mut self) -> Result<(), GraphError> {
        for pass in self.passes.iter_mut() {
            let mut resolved = ResolvedFootprint::default();

            for (name, access) in &pass.textures {
                let id = match self.registry.get(name) {
                    Some(ResourceKey::Texture(id)) => id,
                    Some(ResourceKey::Buffer(_)) => return Err(GraphError::ResourceKindMismatch(name.clone())),
                    None => {
                        let id = self.registry.declare_texture(name);
                        self.registry.textures[id].info = self.default_texture_info;
                        id
                    }
                };
                let slot = &self.registry.textures[id];
                if slot.imported && slot.resource.is_none() {
                    return Err(GraphError::MissingImport(name.clone()));
                }
                if !resolved.textures.contains(&(id, *access)) {
                    resolved.textures.push((id, *access));
                }
            }

            for (name, access) in &pass.buffers {
                let id = match self.registry.get(name) {
                    Some(ResourceKey::Buffer(id)) => id,
                    Some(ResourceKey::Texture(_)) => return Err(GraphError::ResourceKindMismatch(name.clone())),
                    None => self.registry.declare_buffer(name),
                };
                if !resolved.buffers.contains(&(id, *access)) {
                    resolved.buffers.push((id, *access));
                }
            }

            pass.resolved = resolved;
        }
        Ok(())
    }

    /// Create the backing resource of every referenced slot that has none
    fn materialize(&mut self) -> Result<(), GraphError> {
        for pass in &self.passes {
            for &(id, _) in &pass.resolved.textures {
                let slot = &mut self.registry.textures[id];
                if slot.resource.is_some() {
                    continue;
                }
                let info = slot.info.ok_or_else(|| GraphError::MissingResourceInfo(slot.name.clone()))?;
                let texture = self
                    .backend
                    .create_texture(&slot.name, &info)
                    .map_err(|e| Self::backend_error(&slot.name, e))?;
                slot.resource = Some(texture);
                self.log
                    .debug(LOG_TARGET, format_args!("created texture '{}' on first use", slot.name));
            }

            for &(id, _) in &pass.resolved.buffers {
                let slot = &mut self.registry.buffers[id];
                if slot.resource.is_some() {
                    continue;
                }
                let info = slot.info.ok_or_else(|| GraphError::MissingResourceInfo(slot.name.clone()))?;
                let buffer = self
                    .backend
                    .create_buffer(&slot.name, &info)
                    .map_err(|e| Self::backend_error(&slot.name, e))?;
                slot.resource = Some(buffer);
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), GraphError> {
        for pass in &self.passes {
            for (i, &(id, access)) in pass.resolved.textures.iter().enumerate() {
                let slot = &self.registry.textures[id];
                // A missing description is reported once the order is known
                let Some(info) = slot.info else {
                    continue;
                };
                if !info.usage.contains(access.required_usage()) {
                    return Err(GraphError::UsageMismatch {
                        pass: pass.name.clone(),
                        resource: slot.name.clone(),
                        role: access.role_name(),
                    });
                }

                let conflicting = pass.resolved.textures[..i]
                    .iter()
                    .any(|&(other, earlier)| other == id && earlier.layout() != access.layout());
                if conflicting {
                    return Err(GraphError::LayoutConflict {
                        pass: pass.name.clone(),
                        resource: slot.name.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn signature(&self) -> Signature {
        Signature {
            passes: self
                .passes
                .iter()
                .map(|p| (p.name.clone(), p.resolved.clone()))
                .collect(),
            imports: self
                .registry
                .textures
                .iter()
                .filter(|(_, slot)| slot.imported && slot.resource.is_some())
                .map(|(id, _)| id)
                .collect(),
        }
    }

    fn plan_transitions(&self, order: Vec<usize>) -> CompiledPlan {
        let transitions = order
            .iter()
            .map(|&index| {
                let mut needed: Vec<(TextureId, ImageLayout)> = Vec::new();
                for &(id, access) in &self.passes[index].resolved.textures {
                    if !needed.iter().any(|&(t, _)| t == id) {
                        needed.push((id, access.layout()));
                    }
                }
                needed
            })
            .collect();

        let final_transitions = self
            .registry
            .textures
            .iter()
            .filter(|(_, slot)| slot.imported && slot.resource.is_some())
            .filter_map(|(id, slot)| slot.final_layout.map(|layout| (id, layout)))
            .collect();

        CompiledPlan {
            order,
            transitions,
            final_transitions,
        }
    }
}

fn footprint_of(resolved: &ResolvedFootprint) -> Footprint {
    let mut footprint = Footprint::default();
    for &(id, access) in &resolved.textures {
        if access.is_write() {
            footprint.add_write(ResourceKey::Texture(id));
        } else {
            footprint.add_read(ResourceKey::Texture(id));
        }
    }
    for &(id, access) in &resolved.buffers {
        match access {
            BufferAccess::Read => footprint.add_read(ResourceKey::Buffer(id)),
            BufferAccess::Write => footprint.add_write(ResourceKey::Buffer(id)),
        }
    }
    footprint
}

fn record_transition<B: RenderBackend>(
    backend: &mut B,
    cmd: &mut B::CommandContext,
    registry: &mut Registry<B>,
    id: TextureId,
    layout: ImageLayout,
) {
    let Some(slot) = registry.textures.get_mut(id) else {
        return;
    };
    if slot.layout == layout {
        return;
    }
    if let (Some(texture), Some(info)) = (slot.resource.as_ref(), slot.info.as_ref()) {
        backend.transition_texture(cmd, texture, info, slot.layout, layout);
        slot.layout = layout;
    }
}

#[cfg(test)]
mod tests {
    use super::headless::{CommandLog, HeadlessBackend, HeadlessTexture};
    use super::*;
    use crate::logging::CaptureSink;
    use crate::resource::{BufferUsage, TextureFormat, TextureUsage};

    fn color_info() -> TextureInfo {
        TextureInfo::attachment(TextureFormat::Rgba8Unorm, 4, 4).with_usage(TextureUsage::SAMPLED)
    }

    fn building_graph() -> RenderGraph<HeadlessBackend> {
        let mut graph = RenderGraph::new(HeadlessBackend::default());
        graph.set_default_texture_info(Some(color_info()));
        graph.reset();
        graph
    }

    #[test]
    fn passes_need_a_building_graph() {
        let mut graph = RenderGraph::new(HeadlessBackend::default());
        assert!(matches!(
            graph.add_render_pass("early"),
            Err(GraphError::InvalidState { state: GraphState::Idle, .. })
        ));
        assert!(matches!(graph.compile(), Err(GraphError::InvalidState { .. })));

        let mut cmd = CommandLog::default();
        graph.reset();
        assert!(matches!(
            graph.execute(&mut cmd),
            Err(GraphError::InvalidState { state: GraphState::Building, .. })
        ));
    }

    #[test]
    fn duplicate_pass_names_are_rejected() {
        let mut graph = building_graph();
        graph.add_render_pass("scene").unwrap().write_color("color");
        assert!(matches!(
            graph.add_render_pass("scene"),
            Err(GraphError::DuplicatePass(name)) if name == "scene"
        ));
        assert_eq!(graph.pass_count(), 1);
    }

    #[test]
    fn name_keeps_its_kind_and_description() {
        let mut graph = building_graph();
        graph.get_render_texture("color").unwrap();
        assert!(matches!(
            graph.get_render_buffer("color"),
            Err(GraphError::ResourceKindMismatch(_))
        ));

        let other = TextureInfo::attachment(TextureFormat::Rgba16Float, 4, 4);
        assert!(matches!(
            graph.get_render_texture_with("color", other),
            Err(GraphError::ResourceInfoMismatch(_))
        ));
        assert!(graph.get_render_texture_with("color", color_info()).is_ok());
        assert_eq!(graph.backend().textures_created, 1);
    }

    #[test]
    fn texture_without_description_fails_compile() {
        let mut graph = RenderGraph::new(HeadlessBackend::default());
        graph.reset();
        graph.get_render_texture("mystery").unwrap();
        graph.add_render_pass("draw").unwrap().write_color("mystery");
        assert!(matches!(
            graph.compile(),
            Err(GraphError::MissingResourceInfo(name)) if name == "mystery"
        ));
    }

    #[test]
    fn unwritten_texture_is_read_before_write_even_without_description() {
        let mut graph = RenderGraph::new(HeadlessBackend::default());
        graph.reset();
        graph.add_render_pass("post").unwrap().read_texture("ghost");
        assert!(matches!(
            graph.compile(),
            Err(GraphError::ReadBeforeWrite { resource, .. }) if resource == "ghost"
        ));
        assert_eq!(graph.backend().textures_created, 0);
    }

    #[test]
    fn failed_compile_allocates_nothing() {
        let mut graph = building_graph();
        graph.add_render_pass("ping").unwrap().read_texture("b").write_color("a");
        graph.add_render_pass("pong").unwrap().read_texture("a").write_color("b");
        assert!(matches!(graph.compile(), Err(GraphError::Cycle(_))));
        assert_eq!(graph.backend().textures_created, 0);
    }

    #[test]
    fn usage_flags_gate_roles() {
        let mut graph = building_graph();
        let depth_only = TextureInfo::attachment(TextureFormat::Depth32Float, 4, 4);
        graph.get_render_texture_with("depth", depth_only).unwrap();
        graph.add_render_pass("prepass").unwrap().write_depth("depth");
        graph.add_render_pass("lighting").unwrap().read_texture("depth").write_color("color");

        match graph.compile() {
            Err(GraphError::UsageMismatch { pass, resource, role }) => {
                assert_eq!(pass, "lighting");
                assert_eq!(resource, "depth");
                assert_eq!(role, "sampled texture");
            }
            other => panic!("expected a usage mismatch, got {other:?}"),
        }
    }

    #[test]
    fn one_pass_cannot_need_two_layouts() {
        let mut graph = building_graph();
        graph.add_render_pass("feedback").unwrap().read_texture("color").write_color("color");
        assert!(matches!(graph.compile(), Err(GraphError::LayoutConflict { .. })));
    }

    #[test]
    fn transitions_are_recorded_only_on_layout_change() {
        let mut graph = building_graph();
        let mut cmd = CommandLog::default();

        for _ in 0..2 {
            graph.reset();
            graph.add_render_pass("draw").unwrap().write_color("color");
            graph.add_render_pass("post").unwrap().read_texture("color").write_color("output");
            graph.compile().unwrap();
            graph.execute(&mut cmd).unwrap();
        }

        let color_to_attachment = "transition color Undefined -> ColorAttachment";
        let color_to_sampled = "transition color ColorAttachment -> ShaderReadOnly";
        let second_frame = "transition color ShaderReadOnly -> ColorAttachment";
        assert_eq!(
            cmd.entries,
            vec![
                color_to_attachment,
                color_to_sampled,
                "transition output Undefined -> ColorAttachment",
                second_frame,
                color_to_sampled,
            ]
        );
    }

    #[test]
    fn imported_texture_gets_its_final_layout() {
        let mut graph = building_graph();
        let info = TextureInfo::attachment(TextureFormat::Bgra8Srgb, 4, 4);
        graph
            .import_texture(
                "backbuffer",
                HeadlessTexture::new("backbuffer", info),
                info,
                ImageLayout::Undefined,
                Some(ImageLayout::Present),
            )
            .unwrap();
        graph.add_render_pass("blit").unwrap().write_color("backbuffer");
        graph.compile().unwrap();

        let mut cmd = CommandLog::default();
        graph.execute(&mut cmd).unwrap();
        assert_eq!(
            cmd.entries.last().map(String::as_str),
            Some("transition backbuffer ColorAttachment -> Present")
        );
        assert_eq!(graph.backend().textures_created, 0);
    }

    #[test]
    fn stale_import_is_reported() {
        let mut graph = building_graph();
        let info = TextureInfo::attachment(TextureFormat::Bgra8Srgb, 4, 4);
        graph
            .import_texture("backbuffer", HeadlessTexture::new("backbuffer", info), info, ImageLayout::Undefined, None)
            .unwrap();

        graph.reset();
        graph.add_render_pass("blit").unwrap().write_color("backbuffer");
        assert!(matches!(graph.compile(), Err(GraphError::MissingImport(_))));
    }

    #[test]
    fn imports_require_building_state() {
        let mut graph = RenderGraph::new(HeadlessBackend::default());
        let info = color_info();
        let result = graph.import_texture("x", HeadlessTexture::new("x", info), info, ImageLayout::Undefined, None);
        assert!(matches!(result, Err(GraphError::InvalidState { .. })));
    }

    #[test]
    fn pass_errors_carry_the_pass_name() {
        let mut graph = building_graph();
        graph
            .add_render_pass("broken")
            .unwrap()
            .write_color("color")
            .execute(|_| anyhow::bail!("pipeline missing"));
        graph.compile().unwrap();

        let mut cmd = CommandLog::default();
        match graph.execute(&mut cmd) {
            Err(GraphError::PassFailed { pass, source }) => {
                assert_eq!(pass, "broken");
                assert_eq!(source.to_string(), "pipeline missing");
            }
            other => panic!("expected a pass failure, got {other:?}"),
        }
    }

    #[test]
    fn passes_only_see_their_footprint() {
        let mut graph = building_graph();
        graph.get_render_texture("unrelated").unwrap();
        graph.add_render_pass("draw").unwrap().write_color("color").execute(|ctx| {
            assert!(ctx.texture("color").is_ok());
            assert!(matches!(
                ctx.texture("unrelated"),
                Err(GraphError::UndeclaredAccess { .. })
            ));
            Ok(())
        });
        graph
            .add_render_pass("sample")
            .unwrap()
            .read_texture("color")
            .write_color("output")
            .execute(|ctx| {
                assert!(matches!(ctx.texture_mut("color"), Err(GraphError::UndeclaredAccess { .. })));
                assert_eq!(ctx.texture_info("color")?.width, 4);
                Ok(())
            });
        graph.compile().unwrap();
        graph.execute(&mut CommandLog::default()).unwrap();
    }

    #[test]
    fn buffers_flow_between_passes() {
        let mut graph = building_graph();
        graph
            .get_render_buffer_with("counts", BufferInfo::new(4, BufferUsage::STORAGE))
            .unwrap();
        graph.add_render_pass("consume").unwrap().read_buffer("counts").execute(|ctx| {
            assert_eq!(ctx.buffer("counts")?.bytes, vec![7, 0, 0, 0]);
            Ok(())
        });
        graph.add_render_pass("produce").unwrap().write_buffer("counts").execute(|ctx| {
            ctx.buffer_mut("counts")?.bytes[0] = 7;
            Ok(())
        });
        graph.compile().unwrap();
        assert_eq!(graph.order(), vec!["produce", "consume"]);
        graph.execute(&mut CommandLog::default()).unwrap();
    }

    #[test]
    fn unchanged_topology_reuses_the_cached_order() {
        let capture = CaptureSink::new();
        let mut graph = RenderGraph::with_log_sink(HeadlessBackend::default(), capture.clone());
        graph.set_default_texture_info(Some(color_info()));

        for _ in 0..2 {
            graph.reset();
            graph.add_render_pass("post").unwrap().read_texture("color").write_color("output");
            graph.add_render_pass("draw").unwrap().write_color("color");
            graph.compile().unwrap();
            assert_eq!(graph.order(), vec!["draw", "post"]);
        }
        assert!(capture.contains("reusing pass order"));
        assert_eq!(graph.backend().textures_created, 2);
    }

    #[test]
    fn release_resources_forgets_names() {
        let mut graph = building_graph();
        let id = graph.get_render_texture("color").unwrap();
        graph.release_resources();
        assert_eq!(graph.state(), GraphState::Idle);
        assert!(graph.texture(id).is_none());
        assert!(graph.texture_id("color").is_none());
    }
}
