//! Command handlers for the resume-store tool.

pub(crate) mod check;
pub(crate) mod clean;
