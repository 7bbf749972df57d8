mod builder;
pub mod operator;
pub mod ops;
pub mod opset;
mod session;

pub use builder::InterpreterSessionBuilder;
pub use session::InterpreterSession;
