mod desc;
mod results;
mod spec;

pub use desc::{CandidateDescription, ElectionDescription};
pub use results::{CandidateResult, ElectionResults, ResultStatus};
pub use spec::ElectionSpec;
