//! Per-frame command recording.
//!
//! One frame moves four images through graphics, compute and transfer work:
//!
//! ```text
//! offscreen      UNDEFINED -> COLOR_ATTACHMENT -> GENERAL
//! depth          UNDEFINED -> DEPTH_ATTACHMENT
//! compute output UNDEFINED -> GENERAL -> TRANSFER_SRC
//! swapchain      UNDEFINED -> TRANSFER_DST -> PRESENT_SRC
//! ```
//!
//! The whole sequence is data ([`frame_steps`]), built and validated before
//! anything is recorded, then replayed into the command buffer by
//! [`FrameRecording::record`].

use ember_rhi::barrier::{ImageTransition, dispatch_grid, full_barrier, image_copy_region};
use ember_rhi::command::CommandBuffer;
use ember_rhi::physical_device::QueueFamilies;
use ember_rhi::{RhiResult, vk};

use crate::error::RendererResult;

pub use ember_core::COMPUTE_LOCAL_SIZE;

/// Images touched by one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameImages {
    pub offscreen: vk::Image,
    pub depth: vk::Image,
    pub compute_output: vk::Image,
    pub swapchain: vk::Image,
}

/// One step of the frame protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStep {
    Transition(ImageTransition),
    /// Dynamic rendering of the scene and the overlay.
    Render,
    /// Execution barrier with no resources.
    Barrier,
    /// Post-process compute dispatch.
    Dispatch,
    /// Unscaled copy of the compute output into the swapchain image.
    CopyToSwapchain,
}

/// The full frame protocol in recording order.
pub fn frame_steps(images: &FrameImages, families: &QueueFamilies) -> Vec<FrameStep> {
    use vk::ImageLayout as L;

    let color = |image, old, new, family| {
        FrameStep::Transition(ImageTransition::color(image, old, new, family))
    };

    vec![
        color(
            images.offscreen,
            L::UNDEFINED,
            L::COLOR_ATTACHMENT_OPTIMAL,
            families.graphics,
        ),
        FrameStep::Transition(ImageTransition::depth(
            images.depth,
            L::UNDEFINED,
            L::DEPTH_ATTACHMENT_OPTIMAL,
            families.graphics,
        )),
        FrameStep::Render,
        color(
            images.offscreen,
            L::COLOR_ATTACHMENT_OPTIMAL,
            L::GENERAL,
            families.compute,
        ),
        color(
            images.compute_output,
            L::UNDEFINED,
            L::GENERAL,
            families.compute,
        ),
        FrameStep::Barrier,
        FrameStep::Dispatch,
        FrameStep::Barrier,
        color(
            images.compute_output,
            L::GENERAL,
            L::TRANSFER_SRC_OPTIMAL,
            families.transfer,
        ),
        color(
            images.swapchain,
            L::UNDEFINED,
            L::TRANSFER_DST_OPTIMAL,
            families.transfer,
        ),
        FrameStep::CopyToSwapchain,
        color(
            images.swapchain,
            L::TRANSFER_DST_OPTIMAL,
            L::PRESENT_SRC_KHR,
            families.graphics,
        ),
    ]
}

/// The layout transitions of [`frame_steps`], in order.
pub fn frame_transitions(images: &FrameImages, families: &QueueFamilies) -> Vec<ImageTransition> {
    frame_steps(images, families)
        .into_iter()
        .filter_map(|step| match step {
            FrameStep::Transition(transition) => Some(transition),
            _ => None,
        })
        .collect()
}

/// Checks that the post-process output extent can be dispatched.
///
/// The swapchain may settle on a different extent than the window asked for,
/// so this runs once against the real extent before the first frame.
pub fn check_output_extent(extent: vk::Extent2D) -> RhiResult<[u32; 3]> {
    dispatch_grid(extent, COMPUTE_LOCAL_SIZE)
}

/// Work recorded at the non-transition steps.
pub trait FramePasses {
    /// Records the scene and overlay. Dynamic rendering begins and ends here.
    fn render(&mut self, cmd: &CommandBuffer) -> RendererResult<()>;

    /// Binds the compute pipeline and its sets, then dispatches `groups`.
    fn dispatch(&mut self, cmd: &CommandBuffer, groups: [u32; 3]) -> RendererResult<()>;
}

/// A validated frame, ready to be recorded.
#[derive(Clone, Debug)]
pub struct FrameRecording {
    images: FrameImages,
    steps: Vec<FrameStep>,
    copy: vk::ImageCopy,
    groups: [u32; 3],
}

impl FrameRecording {
    /// Validates the copy and dispatch shapes before anything is recorded.
    ///
    /// The compute output must match the swapchain image exactly and be tiled
    /// by [`COMPUTE_LOCAL_SIZE`].
    pub fn new(
        images: FrameImages,
        families: &QueueFamilies,
        compute_output_extent: vk::Extent3D,
        swapchain_extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let swapchain_extent_3d = vk::Extent3D {
            width: swapchain_extent.width,
            height: swapchain_extent.height,
            depth: 1,
        };
        let copy = image_copy_region(compute_output_extent, swapchain_extent_3d)?;
        let groups = dispatch_grid(
            vk::Extent2D {
                width: compute_output_extent.width,
                height: compute_output_extent.height,
            },
            COMPUTE_LOCAL_SIZE,
        )?;

        Ok(Self {
            images,
            steps: frame_steps(&images, families),
            copy,
            groups,
        })
    }

    #[inline]
    pub fn steps(&self) -> &[FrameStep] {
        &self.steps
    }

    #[inline]
    pub fn groups(&self) -> [u32; 3] {
        self.groups
    }

    /// Replays the steps into `cmd`, which must be recording.
    pub fn record<P: FramePasses>(&self, cmd: &CommandBuffer, passes: &mut P) -> RendererResult<()> {
        for step in &self.steps {
            match step {
                FrameStep::Transition(transition) => transition.record(cmd),
                FrameStep::Render => passes.render(cmd)?,
                FrameStep::Barrier => full_barrier(cmd),
                FrameStep::Dispatch => passes.dispatch(cmd, self.groups)?,
                FrameStep::CopyToSwapchain => cmd.copy_image(
                    self.images.compute_output,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    self.images.swapchain,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    self.copy,
                ),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_rhi::vk::Handle;
    use ember_rhi::RhiError;

    fn images() -> FrameImages {
        FrameImages {
            offscreen: vk::Image::from_raw(1),
            depth: vk::Image::from_raw(2),
            compute_output: vk::Image::from_raw(3),
            swapchain: vk::Image::from_raw(4),
        }
    }

    fn families() -> QueueFamilies {
        QueueFamilies {
            graphics: 0,
            present: 0,
            compute: 1,
            transfer: 2,
        }
    }

    fn extent3(width: u32, height: u32) -> vk::Extent3D {
        vk::Extent3D {
            width,
            height,
            depth: 1,
        }
    }

    #[test]
    fn test_transition_order() {
        let images = images();
        let layouts: Vec<(vk::Image, vk::ImageLayout, vk::ImageLayout, u32)> =
            frame_transitions(&images, &families())
                .iter()
                .map(|t| (t.image, t.old_layout, t.new_layout, t.queue_family))
                .collect();

        use vk::ImageLayout as L;
        assert_eq!(
            layouts,
            vec![
                (images.offscreen, L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL, 0),
                (images.depth, L::UNDEFINED, L::DEPTH_ATTACHMENT_OPTIMAL, 0),
                (images.offscreen, L::COLOR_ATTACHMENT_OPTIMAL, L::GENERAL, 1),
                (images.compute_output, L::UNDEFINED, L::GENERAL, 1),
                (images.compute_output, L::GENERAL, L::TRANSFER_SRC_OPTIMAL, 2),
                (images.swapchain, L::UNDEFINED, L::TRANSFER_DST_OPTIMAL, 2),
                (images.swapchain, L::TRANSFER_DST_OPTIMAL, L::PRESENT_SRC_KHR, 0),
            ]
        );
    }

    #[test]
    fn test_depth_uses_depth_aspect() {
        let transitions = frame_transitions(&images(), &families());
        assert_eq!(transitions[1].aspect, vk::ImageAspectFlags::DEPTH);
        assert!(
            transitions
                .iter()
                .filter(|t| t.image != images().depth)
                .all(|t| t.aspect == vk::ImageAspectFlags::COLOR)
        );
    }

    #[test]
    fn test_dispatch_is_fenced_by_barriers() {
        let steps = frame_steps(&images(), &families());
        let dispatch = steps
            .iter()
            .position(|s| *s == FrameStep::Dispatch)
            .unwrap();
        assert_eq!(steps[dispatch - 1], FrameStep::Barrier);
        assert_eq!(steps[dispatch + 1], FrameStep::Barrier);

        let render = steps.iter().position(|s| *s == FrameStep::Render).unwrap();
        let copy = steps
            .iter()
            .position(|s| *s == FrameStep::CopyToSwapchain)
            .unwrap();
        assert!(render < dispatch && dispatch < copy);
        assert!(matches!(steps.last(), Some(FrameStep::Transition(t)) if t.new_layout == vk::ImageLayout::PRESENT_SRC_KHR));
    }

    #[test]
    fn test_recording_validates_copy_extent() {
        let result = FrameRecording::new(
            images(),
            &families(),
            extent3(800, 600),
            vk::Extent2D {
                width: 1024,
                height: 768,
            },
        );
        assert!(matches!(result, Err(RhiError::ExtentMismatch { .. })));
    }

    #[test]
    fn test_recording_validates_dispatch() {
        let result = FrameRecording::new(
            images(),
            &families(),
            extent3(801, 600),
            vk::Extent2D {
                width: 801,
                height: 600,
            },
        );
        assert!(matches!(result, Err(RhiError::InvalidDispatch { .. })));
    }

    #[test]
    fn test_odd_swapchain_extent_rejected_up_front() {
        let odd = vk::Extent2D {
            width: 1366,
            height: 767,
        };
        assert!(matches!(
            check_output_extent(odd),
            Err(RhiError::InvalidDispatch { .. })
        ));
        assert_eq!(
            check_output_extent(vk::Extent2D {
                width: 1366,
                height: 768
            })
            .unwrap(),
            [683, 384, 1]
        );
    }

    #[test]
    fn test_recording_grid_halves_extent() {
        let recording = FrameRecording::new(
            images(),
            &families(),
            extent3(1600, 900),
            vk::Extent2D {
                width: 1600,
                height: 900,
            },
        )
        .unwrap();
        assert_eq!(recording.groups(), [800, 450, 1]);
        assert_eq!(recording.steps().len(), 12);
    }
}
