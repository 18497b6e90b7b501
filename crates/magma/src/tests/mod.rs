//! Scenarios spanning several modules, run against the recording device

mod descriptor_update;
