// Backend seam of the render graph
//
// The graph never talks to a GPU API directly. It asks its backend to create
// the concrete resource behind a name and to record layout transitions.

use crate::resource::{BufferInfo, ImageLayout, TextureInfo};

pub trait RenderBackend {
    /// Concrete texture owned by a graph slot
    type Texture;
    /// Concrete buffer owned by a graph slot
    type Buffer;
    /// The command-recording context handed to passes
    type CommandContext;
    type Error: std::error::Error + Send + Sync + 'static;

    fn create_texture(&mut self, name: &str, info: &TextureInfo) -> Result<Self::Texture, Self::Error>;

    fn create_buffer(&mut self, name: &str, info: &BufferInfo) -> Result<Self::Buffer, Self::Error>;

    /// Record a transition of `texture` from `from` to `to`. Only called when
    /// the two layouts differ.
    ///
    /// This is the only synchronization the graph records. Two passes that
    /// write the same texture in the same layout get no barrier between
    /// them, and buffer write -> read hazards are not covered at all; passes
    /// touching such resources must record their own barriers.
    fn transition_texture(
        &mut self,
        cmd: &mut Self::CommandContext,
        texture: &Self::Texture,
        info: &TextureInfo,
        from: ImageLayout,
        to: ImageLayout,
    );
}
