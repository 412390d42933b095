//! Recording call stream and in-memory surface backend for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use image::{Rgba, RgbaImage};
use parking_lot::Mutex;

use crate::error::{CaptureError, CaptureResult, IntrospectError};
use crate::stream::{CallStream, DrawIndexed, ShaderStage, StageKind};
use crate::surface::{Extent, SurfaceBackend};

pub const TAG: &str = "FINAL_COMPOSITE";
pub const OTHER: u32 = 1;
pub const TARGET: u32 = 2;
pub const OPAQUE: u32 = 3;

/// A host render target. Streams hand out `Weak` references to it.
#[derive(Debug)]
pub struct MockTexture {
    pub id: u32,
    pub extent: Extent,
}

pub fn texture(id: u32, width: u32, height: u32) -> Arc<MockTexture> {
    Arc::new(MockTexture {
        id,
        extent: Extent::new(width, height),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Bind(Option<u32>),
    Draw(DrawIndexed),
}

/// Value returned by [`RecordingStream`], derived only from the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Echo {
    Bound(Option<u32>),
    Drew(u32),
}

/// Records every call it receives. Program `OTHER` and `TARGET` have vertex
/// and fragment stages, `OPAQUE` has none.
pub struct RecordingStream {
    pub calls: Vec<Call>,
    pub programs: HashMap<u32, Vec<ShaderStage>>,
    pub target: Option<Arc<MockTexture>>,
}

impl Default for RecordingStream {
    fn default() -> Self {
        let mut programs = HashMap::new();
        programs.insert(
            OTHER,
            vec![
                ShaderStage::new(StageKind::Vertex, "// sprite vertex"),
                ShaderStage::new(StageKind::Fragment, "// sprite fragment"),
            ],
        );
        programs.insert(
            TARGET,
            vec![
                ShaderStage::new(StageKind::Vertex, "// composite vertex"),
                ShaderStage::new(StageKind::Fragment, format!("#define {TAG}\nvoid main() {{}}")),
            ],
        );
        Self {
            calls: Vec::new(),
            programs,
            target: None,
        }
    }
}

impl RecordingStream {
    pub fn bind_target(&mut self, target: Option<Arc<MockTexture>>) {
        self.target = target;
    }
}

impl CallStream for RecordingStream {
    type Program = u32;
    type Target = Weak<MockTexture>;
    type Output = Echo;

    fn bind_program(&mut self, program: Option<u32>) -> Echo {
        self.calls.push(Call::Bind(program));
        Echo::Bound(program)
    }

    fn draw_indexed(&mut self, call: DrawIndexed) -> Echo {
        let count = call.indices.end.saturating_sub(call.indices.start);
        self.calls.push(Call::Draw(call));
        Echo::Drew(count)
    }

    fn bound_target(&self) -> Option<Weak<MockTexture>> {
        self.target.as_ref().map(Arc::downgrade)
    }

    fn attached_shaders(&self, program: &u32) -> Result<Vec<ShaderStage>, IntrospectError> {
        match self.programs.get(program) {
            Some(stages) if !stages.is_empty() => Ok(stages.clone()),
            _ => Err(IntrospectError::NoAttachedShaders),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockSurface {
    pub id: u64,
    pub extent: Extent,
}

#[derive(Debug, Default)]
pub struct MockState {
    next_id: u64,
    pub live: HashSet<u64>,
    pub created: usize,
    pub destroyed: usize,
    /// (target id, surface id, region)
    pub blits: Vec<(u32, u64, Extent)>,
    pub readbacks: Vec<u32>,
    pub fail_blit: bool,
}

/// In-memory backend; clones share state so tests can inspect it.
#[derive(Clone, Default)]
pub struct MockBackend {
    pub state: Arc<Mutex<MockState>>,
}

impl SurfaceBackend for MockBackend {
    type Surface = MockSurface;
    type Target = Weak<MockTexture>;

    fn create_surface(&mut self, extent: Extent) -> CaptureResult<MockSurface> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.live.insert(id);
        state.created += 1;
        Ok(MockSurface { id, extent })
    }

    fn destroy_surface(&mut self, surface: MockSurface) {
        let mut state = self.state.lock();
        assert!(state.live.remove(&surface.id), "surface destroyed twice");
        state.destroyed += 1;
    }

    fn target_extent(&self, target: &Weak<MockTexture>) -> Option<Extent> {
        target.upgrade().map(|texture| texture.extent)
    }

    fn blit(
        &mut self,
        source: &Weak<MockTexture>,
        destination: &MockSurface,
        region: Extent,
    ) -> CaptureResult<()> {
        let source = source.upgrade().ok_or(CaptureError::StaleTarget)?;
        let mut state = self.state.lock();
        if state.fail_blit {
            return Err(CaptureError::TargetNotCopyable);
        }
        assert!(
            state.live.contains(&destination.id),
            "blit into a destroyed surface"
        );
        state.blits.push((source.id, destination.id, region));
        Ok(())
    }

    fn read_pixels(&mut self, source: &Weak<MockTexture>) -> CaptureResult<RgbaImage> {
        let source = source.upgrade().ok_or(CaptureError::StaleTarget)?;
        self.state.lock().readbacks.push(source.id);
        Ok(RgbaImage::from_pixel(
            source.extent.width,
            source.extent.height,
            Rgba([0, 255, 0, 255]),
        ))
    }
}

/// Feed one pass of the target program: bind, `draws` draws, then bind OTHER.
pub fn run_target_pass<S: CallStream<Program = u32>>(stream: &mut S, draws: u32) {
    stream.bind_program(Some(TARGET));
    for _ in 0..draws {
        stream.draw_indexed(DrawIndexed::count(6));
    }
    stream.bind_program(Some(OTHER));
}
