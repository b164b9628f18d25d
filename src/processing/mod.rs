pub mod binning;
pub mod cleaner;
pub mod correlation;
pub mod distributions;
pub mod hypothesis;
pub mod metrics;
pub mod normality;
pub mod quality;
pub mod statistics;
