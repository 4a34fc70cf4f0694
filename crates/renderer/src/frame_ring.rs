//! Frames in flight.
//!
//! The [`FrameRing`] owns N reusable slots and hands out slot
//! `frame_number mod N` each frame. Before a slot is handed out again the
//! ring blocks until the GPU has finished with it:
//!
//! ```text
//! 1. wait on the slot fence, then reset it       (acquire_frame)
//! 2. acquire a swapchain image -> acquire sem     (acquire_swapchain_image)
//! 3. record the slot's command buffer
//! 4. submit: wait acquire sem, signal submit sem and the slot fence
//! 5. present: wait submit sem
//! 6. frame_number += 1                            (advance)
//! ```
//!
//! The ring is generic over [`RingSlot`] so the reuse discipline can be
//! checked without a GPU.

use std::sync::Arc;

use tracing::{debug, info};

use ember_rhi::command::{CommandBuffer, CommandPool};
use ember_rhi::swapchain::Swapchain;
use ember_rhi::sync::{Fence, Semaphore};
use ember_rhi::{DeletionQueue, Device, RhiResult};

use crate::MAX_FRAMES_IN_FLIGHT;

/// A slot that can be reused once the work last submitted with it is done.
pub trait RingSlot {
    type Error;

    /// Blocks until the slot's previous submission has completed, then
    /// re-arms it for the next one.
    fn wait_and_reset(&mut self) -> Result<(), Self::Error>;
}

/// The slot handed out for the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHandle {
    pub slot: usize,
    pub frame_number: u64,
}

/// Fixed ring of frame slots.
#[derive(Debug)]
pub struct FrameRing<S> {
    slots: Vec<S>,
    frame_number: u64,
}

impl<S: RingSlot> FrameRing<S> {
    /// Returns `None` when `slots` is empty.
    pub fn new(slots: Vec<S>) -> Option<Self> {
        if slots.is_empty() {
            return None;
        }
        Some(Self {
            slots,
            frame_number: 0,
        })
    }

    /// Waits for the current slot to become free and returns it.
    ///
    /// On error the frame number is unchanged.
    pub fn acquire_frame(&mut self) -> Result<FrameHandle, S::Error> {
        let slot = (self.frame_number % self.slots.len() as u64) as usize;
        self.slots[slot].wait_and_reset()?;
        Ok(FrameHandle {
            slot,
            frame_number: self.frame_number,
        })
    }

    /// Moves to the next frame. Call after present.
    pub fn advance(&mut self) {
        self.frame_number += 1;
    }

    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn slot(&self, frame: FrameHandle) -> &S {
        &self.slots[frame.slot]
    }
}

/// GPU resources of one frame slot.
pub struct FrameData {
    command_buffer: CommandBuffer,
    fence: Fence,
    acquire_semaphore: Semaphore,
    submit_semaphore: Semaphore,
}

impl FrameData {
    /// Creates a slot with its own command pool on `queue_family`. The fence
    /// starts signaled so the first wait returns at once.
    pub fn new(
        device: Arc<Device>,
        queue_family: u32,
        deletion: &mut DeletionQueue,
    ) -> RhiResult<Self> {
        let pool = CommandPool::new(device.clone(), queue_family, deletion)?;
        let command_buffer = pool.allocate()?;
        let fence = Fence::new(device.clone(), true, deletion)?;
        let acquire_semaphore = Semaphore::new(&device, deletion)?;
        let submit_semaphore = Semaphore::new(&device, deletion)?;

        Ok(Self {
            command_buffer,
            fence,
            acquire_semaphore,
            submit_semaphore,
        })
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    /// Signaled by the swapchain when the acquired image is ready.
    #[inline]
    pub fn acquire_semaphore(&self) -> Semaphore {
        self.acquire_semaphore
    }

    /// Signaled by the frame's submission; present waits on it.
    #[inline]
    pub fn submit_semaphore(&self) -> Semaphore {
        self.submit_semaphore
    }
}

impl RingSlot for FrameData {
    type Error = ember_rhi::RhiError;

    fn wait_and_reset(&mut self) -> RhiResult<()> {
        self.fence.wait(u64::MAX)?;
        self.fence.reset()
    }
}

impl FrameRing<FrameData> {
    /// Creates [`MAX_FRAMES_IN_FLIGHT`] slots on `queue_family`.
    pub fn create(
        device: &Arc<Device>,
        queue_family: u32,
        deletion: &mut DeletionQueue,
    ) -> RhiResult<Self> {
        let mut slots = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for i in 0..MAX_FRAMES_IN_FLIGHT {
            slots.push(FrameData::new(device.clone(), queue_family, deletion)?);
            debug!("Created frame slot {}", i);
        }
        info!("Frame ring created with {} slots", MAX_FRAMES_IN_FLIGHT);

        Ok(Self {
            slots,
            frame_number: 0,
        })
    }

    /// Blocks until the swapchain hands out an image, signalling the frame's
    /// acquire semaphore.
    pub fn acquire_swapchain_image(
        &self,
        frame: FrameHandle,
        swapchain: &Swapchain,
    ) -> RhiResult<u32> {
        swapchain.acquire_next_image(self.slot(frame).acquire_semaphore.handle())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Wait(usize),
        Submit(usize),
    }

    /// Records waits; a wait only succeeds once the slot's work was submitted
    /// or it has never been used.
    struct MockSlot {
        id: usize,
        in_flight: bool,
        log: Rc<RefCell<Vec<Event>>>,
        fail: bool,
    }

    impl MockSlot {
        fn submit(&mut self) {
            assert!(!self.in_flight, "slot {} submitted twice without a wait", self.id);
            self.in_flight = true;
            self.log.borrow_mut().push(Event::Submit(self.id));
        }
    }

    impl RingSlot for MockSlot {
        type Error = String;

        fn wait_and_reset(&mut self) -> Result<(), String> {
            if self.fail {
                return Err(format!("device lost on slot {}", self.id));
            }
            // the fence signals once the GPU is done; the mock completes instantly
            self.in_flight = false;
            self.log.borrow_mut().push(Event::Wait(self.id));
            Ok(())
        }
    }

    fn ring(n: usize) -> (FrameRing<MockSlot>, Rc<RefCell<Vec<Event>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let slots = (0..n)
            .map(|id| MockSlot {
                id,
                in_flight: false,
                log: log.clone(),
                fail: false,
            })
            .collect();
        (FrameRing::new(slots).unwrap(), log)
    }

    #[test]
    fn test_slots_cycle_modulo_n() {
        let (mut ring, _) = ring(2);
        let slots: Vec<usize> = (0..5)
            .map(|_| {
                let frame = ring.acquire_frame().unwrap();
                ring.advance();
                frame.slot
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
        assert_eq!(ring.frame_number(), 5);
    }

    #[test]
    fn test_slot_reused_only_after_wait() {
        let (mut ring, log) = ring(2);
        for _ in 0..4 {
            let frame = ring.acquire_frame().unwrap();
            ring.slots[frame.slot].submit();
            ring.advance();
        }

        let events = log.borrow().clone();
        // every submit of a slot is preceded by a wait on that same slot
        for (i, event) in events.iter().enumerate() {
            if let Event::Submit(slot) = *event {
                assert_eq!(events[i - 1], Event::Wait(slot));
            }
        }
        assert_eq!(
            events,
            vec![
                Event::Wait(0),
                Event::Submit(0),
                Event::Wait(1),
                Event::Submit(1),
                Event::Wait(0),
                Event::Submit(0),
                Event::Wait(1),
                Event::Submit(1),
            ]
        );
    }

    #[test]
    fn test_failed_wait_propagates_and_keeps_frame() {
        let (mut ring, log) = ring(2);
        ring.slots[0].fail = true;

        assert_eq!(
            ring.acquire_frame(),
            Err("device lost on slot 0".to_string())
        );
        assert_eq!(ring.frame_number(), 0);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_empty_ring_rejected() {
        assert!(FrameRing::<MockSlot>::new(Vec::new()).is_none());
    }

    #[test]
    fn test_frame_data_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameData>();
    }
}
