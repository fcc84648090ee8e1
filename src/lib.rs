pub mod constants;
pub mod defaults;
pub mod error;
pub mod excited_states;
pub mod io;
pub mod utils;

pub use error::ResponseError;
