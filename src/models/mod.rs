pub mod loaders;
pub mod section;
pub mod state;

pub use loaders::{load_source_folder, load_template};
pub use section::{SectionInstruction, SectionMap, SectionNode};
pub use state::{
    Checkpoint, EditStats, ParsedSection, PrepStage, PreparationState, SectionChange,
    SectionEditJob, TargetedEditState,
};
