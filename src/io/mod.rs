mod checkpoint;
mod imprint;
mod input;
mod output;
pub(crate) mod settings;

pub use checkpoint::{ChannelData, Checkpoint};
pub use imprint::{write_footer, write_header};
pub use input::*;
pub use output::{print_roots, write_energies, write_response_matrices};
pub use settings::{
    CollinearityChoice, Configuration, DavidsonConfig, FunctionalChoice, InputConfig,
    ParallelizationConfig, ResponseConfig, XcConfig,
};
