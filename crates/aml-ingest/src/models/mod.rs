//! Data types shared by the pipeline stages and the storage layer.

pub mod domain;
pub mod process;
pub mod reference;
pub mod staged;

pub use domain::{Content, EntityBatch, EntityHeader, EntityStatus, Question, QuestionSet, Taxonomy};
pub use process::{ErrorStatus, Failure, Process, ProcessStatus};
pub use reference::{ReferenceData, ReferenceItem, ReferenceTable, ResolvedRef};
pub use staged::{
    ArithmeticSkill, BusinessKey, CellValue, EntryKind, Fields, NewStagedRow, QuestionBody,
    Requirement, RowStatus, StageFilter, StagedRow,
};
