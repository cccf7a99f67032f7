//! Output column schema

use serde::{Deserialize, Serialize};

/// Target type of one output column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Float,
    Integer,
    Text,
    Timestamp,
}

/// Ordered column name to type mapping, fixed for the life of the process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    columns: Vec<(String, ColumnType)>,
}

impl ColumnSchema {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = (S, ColumnType)>,
        S: Into<String>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|(name, ty)| (name.into().to_ascii_lowercase(), ty))
                .collect(),
        }
    }

    /// ARGO core profile schema
    pub fn argo() -> Self {
        Self::new(ARGO_COLUMNS.iter().copied())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, ColumnType)> {
        self.columns.iter().map(|(name, ty)| (name.as_str(), *ty))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(col, _)| col.eq_ignore_ascii_case(name))
            .map(|(_, ty)| *ty)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Default for ColumnSchema {
    fn default() -> Self {
        Self::argo()
    }
}

use ColumnType::{Float, Integer, Text, Timestamp};

const ARGO_COLUMNS: &[(&str, ColumnType)] = &[
    // Core measurements
    ("pres", Float),
    ("pres_qc", Text),
    ("pres_adjusted", Float),
    ("pres_adjusted_qc", Text),
    ("temp", Float),
    ("temp_qc", Text),
    ("temp_adjusted", Float),
    ("temp_adjusted_qc", Text),
    ("psal", Float),
    ("psal_qc", Text),
    ("psal_adjusted", Float),
    ("psal_adjusted_qc", Text),
    // File metadata
    ("data_type", Text),
    ("format_version", Text),
    ("handbook_version", Text),
    ("reference_date_time", Timestamp),
    ("date_creation", Timestamp),
    ("date_update", Timestamp),
    // Platform and cycle
    ("platform_number", Text),
    ("project_name", Text),
    ("pi_name", Text),
    ("station_parameters", Text),
    ("cycle_number", Integer),
    ("direction", Text),
    ("data_centre", Text),
    ("dc_reference", Text),
    ("data_state_indicator", Text),
    ("data_mode", Text),
    ("platform_type", Text),
    ("float_serial_no", Text),
    ("firmware_version", Text),
    ("wmo_inst_type", Text),
    // Position and time
    ("juld", Float),
    ("juld_qc", Text),
    ("juld_location", Float),
    ("latitude", Float),
    ("longitude", Float),
    ("position_qc", Text),
    ("positioning_system", Text),
    ("profile_pres_qc", Text),
    ("profile_temp_qc", Text),
    ("profile_psal_qc", Text),
    ("vertical_sampling_scheme", Text),
    ("config_mission_number", Text),
    ("pres_adjusted_error", Float),
    ("temp_adjusted_error", Float),
    ("psal_adjusted_error", Float),
    // Calibration
    ("parameter", Text),
    ("scientific_calib_equation", Text),
    ("scientific_calib_coefficient", Text),
    ("scientific_calib_comment", Text),
    ("scientific_calib_date", Timestamp),
    // History
    ("history_institution", Text),
    ("history_step", Text),
    ("history_software", Text),
    ("history_software_release", Text),
    ("history_reference", Text),
    ("history_date", Timestamp),
    ("history_action", Text),
    ("history_parameter", Text),
    ("history_start_pres", Float),
    ("history_stop_pres", Float),
    ("history_previous_value", Text),
    ("history_qctest", Text),
    ("crs", Text),
];
