mod envelope;
mod story;
mod view;

pub use envelope::*;
pub use story::*;
pub use view::*;
