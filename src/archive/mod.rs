pub mod layout;
pub mod participant_filter;

pub use layout::{validate_component, ArchiveLayout, DateDirectory};
pub use participant_filter::ParticipantFilter;
