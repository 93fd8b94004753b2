//! CPU side stand-ins for the renderer and the landscape.
//!
//! [`HeadlessGpu`] keeps texture memory in plain byte vectors, resolves fences
//! a configurable number of frames after they were queued and never touches
//! a real device. It is what the tests drive the brush pipeline with, and it
//! is handy for batch tools that replay strokes without a window.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use bevy::math::{Rect, URect, UVec2, Vec4};
use image::{Rgba32FImage, RgbaImage};

use crate::error::{BrushEditorError, BrushResult};
use crate::gpu::{
    BrushDraw, CallbackToken, FenceCallback, FenceId, GpuBackend, TextureDescriptor,
    TextureFormat, TextureHandle,
};
use crate::heightmap::pack_height;
use crate::landscape::{Landscape, LandscapeTextureSemantic, RenderMode, TextureSlot};
use crate::material::Material;

/// What a brush draw looked like, kept for inspection.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub target: TextureHandle,
    pub target_level: u32,
    pub scissor: Option<Rect>,
    pub material: Material,
}

impl DrawRecord {
    /// Scissor rect in pixels of a target level of `size`.
    pub fn scissor_pixels(&self, size: UVec2) -> URect {
        match self.scissor {
            Some(rect) => {
                let min = (rect.min * size.as_vec2()).floor().as_uvec2().min(size);
                let max = (rect.max * size.as_vec2()).ceil().as_uvec2().min(size);
                URect::from_corners(min, max)
            }
            None => URect::from_corners(UVec2::ZERO, size),
        }
    }
}

/// Rasterizes a draw on the CPU: gets the record, the target level bytes and
/// the level size.
pub type DrawHook = Box<dyn Fn(&DrawRecord, &mut [u8], UVec2) + Send + Sync>;

struct HeadlessTexture {
    descriptor: TextureDescriptor,
    levels: Vec<Vec<u8>>,
}

impl HeadlessTexture {
    fn new(descriptor: &TextureDescriptor) -> Self {
        let levels = (0..descriptor.mip_levels.max(1))
            .map(|level| {
                let size = descriptor.mip_size(level);
                vec![0; (size.x * size.y) as usize * descriptor.format.bytes_per_pixel()]
            })
            .collect();

        Self {
            descriptor: descriptor.clone(),
            levels,
        }
    }
}

struct PendingCallback {
    token: CallbackToken,
    fence: FenceId,
    callback: FenceCallback,
}

struct HeadlessState {
    next_texture: u64,
    next_token: u64,
    frame: u64,
    completed_through: u64,
    textures: HashMap<TextureHandle, HeadlessTexture>,
    callbacks: Vec<PendingCallback>,
    pick_size: UVec2,
    pick_buffer: Vec<Vec4>,
    picking_pass: bool,
    draws: Vec<DrawRecord>,
    blits: Vec<(Rect, TextureHandle)>,
    not_ready: HashSet<String>,
    missing_paths: HashSet<PathBuf>,
    loaded: HashMap<PathBuf, TextureHandle>,
}

pub struct HeadlessGpu {
    state: Mutex<HeadlessState>,
    fence_latency: u64,
    draw_hook: Option<DrawHook>,
}

impl Default for HeadlessGpu {
    fn default() -> Self {
        Self::new(UVec2::new(64, 64))
    }
}

impl HeadlessGpu {
    /// `pick_size` is the size of the uv-picking runtime texture.
    pub fn new(pick_size: UVec2) -> Self {
        Self {
            state: Mutex::new(HeadlessState {
                next_texture: 1,
                next_token: 1,
                frame: 1,
                completed_through: 0,
                textures: HashMap::new(),
                callbacks: Vec::new(),
                pick_size,
                pick_buffer: vec![Vec4::W; (pick_size.x * pick_size.y) as usize],
                picking_pass: false,
                draws: Vec::new(),
                blits: Vec::new(),
                not_ready: HashSet::new(),
                missing_paths: HashSet::new(),
                loaded: HashMap::new(),
            }),
            fence_latency: 0,
            draw_hook: None,
        }
    }

    /// Number of extra frames a fence stays unsignaled after its frame ended.
    pub fn with_fence_latency(mut self, frames: u64) -> Self {
        self.fence_latency = frames;
        self
    }

    pub fn with_draw_hook(mut self, hook: DrawHook) -> Self {
        self.draw_hook = Some(hook);
        self
    }

    fn state(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ends the current frame and fires the callbacks of every fence that
    /// completed.
    pub fn end_frame(&self) {
        let ready = {
            let mut state = self.state();
            state.frame += 1;
            let completed = state.frame.saturating_sub(1 + self.fence_latency);
            state.completed_through = state.completed_through.max(completed);
            Self::take_completed(&mut state)
        };

        for pending in ready {
            (pending.callback)();
        }
    }

    /// Signals every fence queued so far.
    pub fn flush(&self) {
        let ready = {
            let mut state = self.state();
            state.completed_through = state.frame;
            Self::take_completed(&mut state)
        };

        for pending in ready {
            (pending.callback)();
        }
    }

    fn take_completed(state: &mut HeadlessState) -> Vec<PendingCallback> {
        let completed_through = state.completed_through;
        let (ready, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut state.callbacks)
            .into_iter()
            .partition(|pending| pending.fence.0 <= completed_through);
        state.callbacks = pending;
        ready
    }

    pub fn frame(&self) -> u64 {
        self.state().frame
    }

    pub fn pending_callback_count(&self) -> usize {
        self.state().callbacks.len()
    }

    pub fn live_texture_count(&self) -> usize {
        self.state().textures.len()
    }

    pub fn texture_exists(&self, texture: TextureHandle) -> bool {
        self.state().textures.contains_key(&texture)
    }

    /// Fills the whole picking buffer with one value.
    pub fn set_pick_value(&self, value: Vec4) {
        let mut state = self.state();
        state.pick_buffer.iter_mut().for_each(|pixel| *pixel = value);
    }

    pub fn set_pick_pixel(&self, x: u32, y: u32, value: Vec4) {
        let mut state = self.state();
        let width = state.pick_size.x;
        if let Some(pixel) = state.pick_buffer.get_mut((y * width + x) as usize) {
            *pixel = value;
        }
    }

    pub fn picking_pass_enabled(&self) -> bool {
        self.state().picking_pass
    }

    /// Draws with a material of this fx report "not ready".
    pub fn set_material_ready(&self, fx_name: &str, ready: bool) {
        let mut state = self.state();
        if ready {
            state.not_ready.remove(fx_name);
        } else {
            state.not_ready.insert(fx_name.to_string());
        }
    }

    pub fn mark_missing(&self, path: impl Into<PathBuf>) {
        self.state().missing_paths.insert(path.into());
    }

    pub fn draws(&self) -> Vec<DrawRecord> {
        self.state().draws.clone()
    }

    pub fn clear_draws(&self) {
        self.state().draws.clear();
    }

    pub fn blits(&self) -> Vec<(Rect, TextureHandle)> {
        self.state().blits.clone()
    }

    pub fn texture_bytes(&self, texture: TextureHandle, level: u32) -> Option<Vec<u8>> {
        self.state()
            .textures
            .get(&texture)
            .and_then(|texture| texture.levels.get(level as usize).cloned())
    }

    pub fn write_texture(&self, texture: TextureHandle, level: u32, bytes: &[u8]) -> bool {
        let mut state = self.state();
        let Some(target) = state
            .textures
            .get_mut(&texture)
            .and_then(|texture| texture.levels.get_mut(level as usize))
        else {
            return false;
        };

        if target.len() != bytes.len() {
            return false;
        }

        target.copy_from_slice(bytes);
        true
    }

    /// Fills mip 0 of an RGBA8 texture with packed 16 bit heights.
    pub fn fill_heights(&self, texture: TextureHandle, height: u16) -> bool {
        let Some(mut bytes) = self.texture_bytes(texture, 0) else {
            return false;
        };

        for pixel in bytes.chunks_exact_mut(4) {
            pixel.copy_from_slice(&pack_height(height));
        }

        self.write_texture(texture, 0, &bytes)
    }
}

impl GpuBackend for HeadlessGpu {
    fn create_texture(&self, descriptor: &TextureDescriptor) -> TextureHandle {
        let mut state = self.state();
        let handle = TextureHandle(state.next_texture);
        state.next_texture += 1;
        state.textures.insert(handle, HeadlessTexture::new(descriptor));
        handle
    }

    fn release_texture(&self, texture: TextureHandle) {
        let mut state = self.state();
        state.textures.remove(&texture);
        state.loaded.retain(|_, loaded| *loaded != texture);
    }

    fn texture_descriptor(&self, texture: TextureHandle) -> Option<TextureDescriptor> {
        self.state()
            .textures
            .get(&texture)
            .map(|texture| texture.descriptor.clone())
    }

    fn load_texture(&self, path: &Path) -> BrushResult<TextureHandle> {
        {
            let state = self.state();
            if state.missing_paths.contains(path) {
                return Err(BrushEditorError::TextureLoad(path.display().to_string()));
            }
            if let Some(loaded) = state.loaded.get(path) {
                return Ok(*loaded);
            }
        }

        let texture =
            self.create_texture(&TextureDescriptor::readback_target(32, 32, TextureFormat::Rgba8));
        self.state().loaded.insert(path.to_path_buf(), texture);
        Ok(texture)
    }

    fn current_frame_fence(&self) -> FenceId {
        FenceId(self.state().frame)
    }

    fn register_fence_callback(&self, fence: FenceId, callback: FenceCallback) -> CallbackToken {
        let mut state = self.state();
        let token = CallbackToken(state.next_token);
        state.next_token += 1;

        if fence.0 <= state.completed_through {
            drop(state);
            callback();
            return token;
        }

        state.callbacks.push(PendingCallback {
            token,
            fence,
            callback,
        });
        token
    }

    fn unregister_fence_callback(&self, token: CallbackToken) {
        self.state().callbacks.retain(|pending| pending.token != token);
    }

    fn pick_texture_size(&self) -> UVec2 {
        self.state().pick_size
    }

    fn blit_pick_rect(&self, source: Rect, target: TextureHandle) {
        let mut state = self.state();
        state.blits.push((source, target));

        let pick_size = state.pick_size;
        let Some(size) = state
            .textures
            .get(&target)
            .filter(|texture| texture.descriptor.format == TextureFormat::Rgba32F)
            .map(|texture| texture.descriptor.size())
        else {
            return;
        };

        let origin = source.min.floor();
        let mut pixels = Vec::with_capacity((size.x * size.y * 4) as usize);
        for y in 0..size.y {
            for x in 0..size.x {
                let sx = (origin.x + x as f32).clamp(0.0, (pick_size.x - 1) as f32) as u32;
                let sy = (origin.y + y as f32).clamp(0.0, (pick_size.y - 1) as f32) as u32;
                let value = state.pick_buffer[(sy * pick_size.x + sx) as usize];
                pixels.extend_from_slice(&value.to_array());
            }
        }

        if let Some(texture) = state.textures.get_mut(&target) {
            texture.levels[0].copy_from_slice(bytemuck::cast_slice(&pixels));
        }
    }

    fn read_texture_f32(&self, texture: TextureHandle) -> BrushResult<Rgba32FImage> {
        let state = self.state();
        let source = state
            .textures
            .get(&texture)
            .ok_or(BrushEditorError::MissingTexture(texture))?;

        if source.descriptor.format != TextureFormat::Rgba32F {
            return Err(BrushEditorError::readback(texture, "texture is not RGBA32F"));
        }

        let pixels: Vec<f32> = source.levels[0]
            .chunks_exact(4)
            .map(|bytes| f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            .collect();
        Rgba32FImage::from_raw(source.descriptor.width, source.descriptor.height, pixels)
            .ok_or_else(|| BrushEditorError::readback(texture, "pixel buffer size mismatch"))
    }

    fn read_texture_region(
        &self,
        texture: TextureHandle,
        region: URect,
    ) -> BrushResult<RgbaImage> {
        let state = self.state();
        let source = state
            .textures
            .get(&texture)
            .ok_or(BrushEditorError::MissingTexture(texture))?;

        if source.descriptor.format != TextureFormat::Rgba8 {
            return Err(BrushEditorError::readback(texture, "texture is not RGBA8"));
        }

        let size = source.descriptor.size();
        if region.max.x > size.x || region.max.y > size.y {
            return Err(BrushEditorError::readback(
                texture,
                format!("region {region:?} exceeds texture size {size}"),
            ));
        }

        let width = region.width();
        let height = region.height();
        let mut bytes = Vec::with_capacity((width * height * 4) as usize);
        for y in region.min.y..region.max.y {
            let row_start = ((y * size.x + region.min.x) * 4) as usize;
            bytes.extend_from_slice(&source.levels[0][row_start..row_start + (width * 4) as usize]);
        }

        RgbaImage::from_raw(width, height, bytes)
            .ok_or_else(|| BrushEditorError::readback(texture, "pixel buffer size mismatch"))
    }

    fn copy_texture(&self, source: TextureHandle, target: TextureHandle) {
        let mut state = self.state();
        let Some(source) = state.textures.get(&source) else {
            return;
        };

        let source_descriptor = source.descriptor.clone();
        let levels = source.levels.clone();

        let Some(target) = state.textures.get_mut(&target) else {
            return;
        };

        if target.descriptor.format != source_descriptor.format
            || target.descriptor.size() != source_descriptor.size()
        {
            return;
        }

        for (target_level, source_level) in target.levels.iter_mut().zip(levels) {
            target_level.copy_from_slice(&source_level);
        }
    }

    fn draw_brush(&self, draw: &BrushDraw) -> BrushResult<()> {
        let mut state = self.state();
        if state.not_ready.contains(draw.material.fx_name()) {
            return Err(BrushEditorError::MaterialNotReady(
                draw.material.fx_name().to_string(),
            ));
        }

        let record = DrawRecord {
            target: draw.target,
            target_level: draw.target_level,
            scissor: draw.scissor,
            material: draw.material.clone(),
        };

        if let Some(hook) = &self.draw_hook {
            if let Some(texture) = state.textures.get_mut(&draw.target) {
                let size = texture.descriptor.mip_size(draw.target_level);
                if let Some(level) = texture.levels.get_mut(draw.target_level as usize) {
                    hook(&record, level, size);
                }
            }
        }

        state.draws.push(record);
        Ok(())
    }

    fn set_picking_pass(&self, enabled: bool) {
        self.state().picking_pass = enabled;
    }
}

/// A landscape that keeps its heightmap in memory.
pub struct MemoryLandscape {
    textures: BTreeMap<TextureSlot, TextureHandle>,
    heightmap: Vec<u16>,
    heightmap_size: UVec2,
    world_size: f32,
    world_height: f32,
    render_mode: RenderMode,
    material: Material,
    visible_in_picking_pass: bool,
    heightmap_updates: Vec<(URect, BTreeMap<TextureSlot, TextureHandle>)>,
}

impl MemoryLandscape {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            textures: BTreeMap::new(),
            heightmap: vec![0; (width * height) as usize],
            heightmap_size: UVec2::new(width, height),
            world_size: 1024.0,
            world_height: 100.0,
            render_mode: RenderMode::InstancingMorphing,
            material: Material::new("~res:/Materials2/Landscape.material"),
            visible_in_picking_pass: false,
            heightmap_updates: Vec::new(),
        }
    }

    pub fn with_texture(mut self, slot: TextureSlot, texture: TextureHandle) -> Self {
        self.textures.insert(slot, texture);
        self
    }

    pub fn with_render_mode(mut self, render_mode: RenderMode) -> Self {
        self.render_mode = render_mode;
        self
    }

    pub fn with_world_dimensions(mut self, size: f32, height: f32) -> Self {
        self.world_size = size;
        self.world_height = height;
        self
    }

    pub fn heights(&self) -> &[u16] {
        &self.heightmap
    }

    pub fn height_at(&self, x: u32, y: u32) -> u16 {
        self.heightmap[(y * self.heightmap_size.x + x) as usize]
    }

    pub fn heightmap_region(&self, rect: URect) -> Vec<u16> {
        let mut region = Vec::with_capacity((rect.width() * rect.height()) as usize);
        for y in rect.min.y..rect.max.y {
            for x in rect.min.x..rect.max.x {
                region.push(self.height_at(x, y));
            }
        }
        region
    }

    /// Every heightmap update so far, with the textures that were live while
    /// it ran.
    pub fn heightmap_updates(&self) -> &[(URect, BTreeMap<TextureSlot, TextureHandle>)] {
        &self.heightmap_updates
    }
}

impl Landscape for MemoryLandscape {
    fn texture(&self, slot: TextureSlot) -> Option<TextureHandle> {
        self.textures.get(&slot).copied()
    }

    fn set_texture(&mut self, slot: TextureSlot, texture: TextureHandle) {
        self.textures.insert(slot, texture);
    }

    fn texture_count(&self, semantic: LandscapeTextureSemantic) -> usize {
        self.textures
            .keys()
            .filter(|slot| slot.semantic == semantic)
            .count()
    }

    fn landscape_size(&self) -> f32 {
        self.world_size
    }

    fn landscape_height(&self) -> f32 {
        self.world_height
    }

    fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    fn material(&self) -> &Material {
        &self.material
    }

    fn material_mut(&mut self) -> &mut Material {
        &mut self.material
    }

    fn set_visible_in_picking_pass(&mut self, visible: bool) {
        self.visible_in_picking_pass = visible;
    }

    fn is_visible_in_picking_pass(&self) -> bool {
        self.visible_in_picking_pass
    }

    fn update_heightmap(&mut self, data: &[u16], rect: URect) {
        let width = rect.width() as usize;
        let max = rect.max.min(self.heightmap_size);

        for y in rect.min.y..max.y {
            for x in rect.min.x..max.x {
                let source = (y - rect.min.y) as usize * width + (x - rect.min.x) as usize;
                if let Some(value) = data.get(source) {
                    self.heightmap[(y * self.heightmap_size.x + x) as usize] = *value;
                }
            }
        }

        self.heightmap_updates.push((rect, self.textures.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn fences_signal_after_the_configured_latency() {
        let gpu = HeadlessGpu::default().with_fence_latency(1);
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        let fence = gpu.current_frame_fence();
        gpu.register_fence_callback(
            fence,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        gpu.end_frame();
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        gpu.end_frame();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(gpu.pending_callback_count(), 0);
    }

    #[test]
    fn unregistered_callbacks_never_fire() {
        let gpu = HeadlessGpu::default();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = fired.clone();
        let token = gpu.register_fence_callback(
            gpu.current_frame_fence(),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        gpu.unregister_fence_callback(token);
        gpu.flush();

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn region_readback_returns_rows_of_the_region() {
        let gpu = HeadlessGpu::default();
        let texture =
            gpu.create_texture(&TextureDescriptor::readback_target(4, 4, TextureFormat::Rgba8));
        let bytes: Vec<u8> = (0..16u8).flat_map(|i| [i, 0, 0, 255]).collect();
        assert!(gpu.write_texture(texture, 0, &bytes));

        let region = gpu
            .read_texture_region(texture, URect::new(1, 2, 3, 4))
            .unwrap();

        assert_eq!(region.dimensions(), (2, 2));
        assert_eq!(region.get_pixel(0, 0)[0], 9);
        assert_eq!(region.get_pixel(1, 1)[0], 14);
    }

    #[test]
    fn memory_landscape_updates_the_rect_only() {
        let mut landscape = MemoryLandscape::new(4, 4);
        landscape.update_heightmap(&[7, 8, 9, 10], URect::new(1, 1, 3, 3));

        assert_eq!(landscape.height_at(1, 1), 7);
        assert_eq!(landscape.height_at(2, 2), 10);
        assert_eq!(landscape.height_at(0, 0), 0);
        assert_eq!(landscape.heightmap_updates().len(), 1);
    }
}
