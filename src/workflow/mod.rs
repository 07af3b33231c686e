pub mod section_ctx;
pub mod section_edit_flow;
pub mod section_flow;

pub use section_ctx::SectionCtx;
pub use section_edit_flow::{EditOutcome, SectionEditFlow};
pub use section_flow::{SectionDraftJob, SectionFlow, END_OF_SECTION_MARKER};
