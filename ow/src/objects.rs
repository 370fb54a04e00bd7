mod classes;
mod exceptions;
mod functions;
mod modules;
mod strings;
mod tuples;

pub use classes::*;
pub use exceptions::*;
pub use functions::*;
pub use modules::*;
pub use strings::*;
pub use tuples::*;
