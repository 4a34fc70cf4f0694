//! Platform layer: winit window, Vulkan surface and keyboard state.

mod input;
mod window;

pub use input::{InputState, KeyCode};
pub use window::{Surface, Window, required_extensions};

// Re-export winit types that users might need
pub use winit::event::{KeyEvent, WindowEvent};
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
