//! Pool of small GPU readable textures used for cursor picking.
//!
//! Every acquisition is tagged with a frame fence. The backend signals the
//! fence from wherever it likes; the callback only pushes the fence id into a
//! channel, and the owning thread drains that channel in [`ReadbackRing::collect_ready`].

use std::sync::Arc;

use async_channel::{Receiver, Sender};
use bevy::log::debug;

use crate::gpu::{CallbackToken, FenceId, GpuBackend, TextureDescriptor, TextureHandle};

struct ReadbackSlot {
    texture: TextureHandle,
    fence: Option<FenceId>,
    token: Option<CallbackToken>,
}

impl ReadbackSlot {
    fn is_free(&self) -> bool {
        self.fence.is_none()
    }
}

pub struct ReadbackRing {
    backend: Arc<dyn GpuBackend>,
    descriptor: TextureDescriptor,
    slots: Vec<ReadbackSlot>,
    signaled_tx: Sender<FenceId>,
    signaled_rx: Receiver<FenceId>,
}

impl ReadbackRing {
    /// Pre-allocates `slot_count` textures of `descriptor`.
    pub fn new(
        backend: Arc<dyn GpuBackend>,
        descriptor: TextureDescriptor,
        slot_count: usize,
    ) -> Self {
        let (signaled_tx, signaled_rx) = async_channel::unbounded();

        let slots = (0..slot_count)
            .map(|_| ReadbackSlot {
                texture: backend.create_texture(&descriptor),
                fence: None,
                token: None,
            })
            .collect();

        Self {
            backend,
            descriptor,
            slots,
            signaled_tx,
            signaled_rx,
        }
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Slots whose fence has not been collected yet.
    pub fn pending_count(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_free()).count()
    }

    /// Hands out a texture that the caller may write into during this frame.
    ///
    /// The pixels are only meaningful once the texture comes back from
    /// [`Self::collect_ready`]. The pool grows by one slot when every slot is
    /// still in flight.
    pub fn acquire_texture(&mut self, fence: FenceId) -> TextureHandle {
        let index = match self.slots.iter().position(ReadbackSlot::is_free) {
            Some(index) => index,
            None => {
                debug!(
                    "readback ring exhausted, growing to {} slots",
                    self.slots.len() + 1
                );
                self.slots.push(ReadbackSlot {
                    texture: self.backend.create_texture(&self.descriptor),
                    fence: None,
                    token: None,
                });
                self.slots.len() - 1
            }
        };

        debug_assert!(
            self.slots[index].fence.is_none() && self.slots[index].token.is_none(),
            "readback slot already carries a fence"
        );

        // A slot is marked busy before registering: the backend may fire the
        // callback right away for an already signaled fence.
        self.slots[index].fence = Some(fence);

        let signaled = self.signaled_tx.clone();
        let token = self.backend.register_fence_callback(
            fence,
            Box::new(move || {
                let _ = signaled.try_send(fence);
            }),
        );

        self.slots[index].token = Some(token);
        self.slots[index].texture
    }

    /// Frees every slot whose fence has signaled since the last call and
    /// returns their textures in signal order.
    pub fn collect_ready(&mut self) -> Vec<TextureHandle> {
        let mut ready = Vec::new();

        while let Ok(fence) = self.signaled_rx.try_recv() {
            let Some(slot) = self
                .slots
                .iter_mut()
                .find(|slot| slot.fence == Some(fence))
            else {
                continue;
            };

            slot.fence = None;
            slot.token = None;
            ready.push(slot.texture);
        }

        ready
    }
}

impl Drop for ReadbackRing {
    fn drop(&mut self) {
        for slot in self.slots.drain(..) {
            if let Some(token) = slot.token {
                self.backend.unregister_fence_callback(token);
            }
            self.backend.release_texture(slot.texture);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::TextureFormat;
    use crate::headless::HeadlessGpu;

    fn ring(gpu: &Arc<HeadlessGpu>, slots: usize) -> ReadbackRing {
        ReadbackRing::new(
            gpu.clone(),
            TextureDescriptor::readback_target(8, 8, TextureFormat::Rgba32F),
            slots,
        )
    }

    #[test]
    fn acquiring_past_capacity_adds_exactly_one_slot() {
        let gpu = Arc::new(HeadlessGpu::default());
        let mut ring = ring(&gpu, 4);
        let fence = gpu.current_frame_fence();

        let textures: Vec<_> = (0..4).map(|_| ring.acquire_texture(fence)).collect();
        assert_eq!(ring.slot_count(), 4);
        assert_eq!(ring.pending_count(), 4);

        let extra = ring.acquire_texture(fence);
        assert_eq!(ring.slot_count(), 5);
        assert!(!textures.contains(&extra));
    }

    #[test]
    fn slots_come_back_once_their_fence_signals() {
        let gpu = Arc::new(HeadlessGpu::default().with_fence_latency(1));
        let mut ring = ring(&gpu, 2);

        let first = ring.acquire_texture(gpu.current_frame_fence());
        gpu.end_frame();
        assert!(ring.collect_ready().is_empty());

        let second = ring.acquire_texture(gpu.current_frame_fence());
        assert_ne!(first, second);

        gpu.end_frame();
        assert_eq!(ring.collect_ready(), vec![first]);
        assert_eq!(ring.pending_count(), 1);

        gpu.end_frame();
        assert_eq!(ring.collect_ready(), vec![second]);
        assert_eq!(ring.pending_count(), 0);
        assert_eq!(ring.slot_count(), 2);
    }

    #[test]
    fn free_slots_are_reused_before_growing() {
        let gpu = Arc::new(HeadlessGpu::default());
        let mut ring = ring(&gpu, 1);

        for _ in 0..10 {
            ring.acquire_texture(gpu.current_frame_fence());
            gpu.end_frame();
            assert_eq!(ring.collect_ready().len(), 1);
        }

        assert_eq!(ring.slot_count(), 1);
    }

    #[test]
    fn dropping_the_ring_unregisters_pending_callbacks() {
        let gpu = Arc::new(HeadlessGpu::default().with_fence_latency(3));
        let textures_before = gpu.live_texture_count();

        let mut ring = ring(&gpu, 2);
        ring.acquire_texture(gpu.current_frame_fence());
        ring.acquire_texture(gpu.current_frame_fence());
        assert_eq!(gpu.pending_callback_count(), 2);

        drop(ring);

        assert_eq!(gpu.pending_callback_count(), 0);
        assert_eq!(gpu.live_texture_count(), textures_before);
        gpu.flush();
    }
}
