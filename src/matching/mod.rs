//! Required-versus-detected equipment matching.

pub mod matcher;

pub use matcher::{
    completion_percentage, evaluate, names_overlap, ChecklistEntry, ChecklistReport, ItemStatus,
};
