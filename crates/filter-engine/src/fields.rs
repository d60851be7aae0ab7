//! 规则可引用的设备字段

use crate::error::FilterError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 设备字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldType {
    // 注入类通用字段
    Id,
    Name,
    Country,
    NominalVoltage,
    VoltageLevelId,
    Connected,

    // 发电机
    EnergySource,
    MinP,
    MaxP,
    TargetP,
    TargetQ,
    TargetV,
    VoltageRegulatorOn,
    RatedS,
    PlannedActivePowerSetPoint,
    MarginalCost,
    PlannedOutageRate,
    ForcedOutageRate,

    // 负荷
    LoadType,
    P0,
    Q0,

    // 线路两侧
    #[serde(rename = "VOLTAGE_LEVEL_ID_1")]
    VoltageLevelId1,
    #[serde(rename = "VOLTAGE_LEVEL_ID_2")]
    VoltageLevelId2,
    #[serde(rename = "NOMINAL_VOLTAGE_1")]
    NominalVoltage1,
    #[serde(rename = "NOMINAL_VOLTAGE_2")]
    NominalVoltage2,
    #[serde(rename = "COUNTRY_1")]
    Country1,
    #[serde(rename = "COUNTRY_2")]
    Country2,
    #[serde(rename = "CONNECTED_1")]
    Connected1,
    #[serde(rename = "CONNECTED_2")]
    Connected2,
    SeriesResistance,
    SeriesReactance,

    // 属性
    FreeProperties,
    SubstationProperties,
}

impl FieldType {
    pub const ALL: [FieldType; 33] = [
        Self::Id,
        Self::Name,
        Self::Country,
        Self::NominalVoltage,
        Self::VoltageLevelId,
        Self::Connected,
        Self::EnergySource,
        Self::MinP,
        Self::MaxP,
        Self::TargetP,
        Self::TargetQ,
        Self::TargetV,
        Self::VoltageRegulatorOn,
        Self::RatedS,
        Self::PlannedActivePowerSetPoint,
        Self::MarginalCost,
        Self::PlannedOutageRate,
        Self::ForcedOutageRate,
        Self::LoadType,
        Self::P0,
        Self::Q0,
        Self::VoltageLevelId1,
        Self::VoltageLevelId2,
        Self::NominalVoltage1,
        Self::NominalVoltage2,
        Self::Country1,
        Self::Country2,
        Self::Connected1,
        Self::Connected2,
        Self::SeriesResistance,
        Self::SeriesReactance,
        Self::FreeProperties,
        Self::SubstationProperties,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::Name => "NAME",
            Self::Country => "COUNTRY",
            Self::NominalVoltage => "NOMINAL_VOLTAGE",
            Self::VoltageLevelId => "VOLTAGE_LEVEL_ID",
            Self::Connected => "CONNECTED",
            Self::EnergySource => "ENERGY_SOURCE",
            Self::MinP => "MIN_P",
            Self::MaxP => "MAX_P",
            Self::TargetP => "TARGET_P",
            Self::TargetQ => "TARGET_Q",
            Self::TargetV => "TARGET_V",
            Self::VoltageRegulatorOn => "VOLTAGE_REGULATOR_ON",
            Self::RatedS => "RATED_S",
            Self::PlannedActivePowerSetPoint => "PLANNED_ACTIVE_POWER_SET_POINT",
            Self::MarginalCost => "MARGINAL_COST",
            Self::PlannedOutageRate => "PLANNED_OUTAGE_RATE",
            Self::ForcedOutageRate => "FORCED_OUTAGE_RATE",
            Self::LoadType => "LOAD_TYPE",
            Self::P0 => "P0",
            Self::Q0 => "Q0",
            Self::VoltageLevelId1 => "VOLTAGE_LEVEL_ID_1",
            Self::VoltageLevelId2 => "VOLTAGE_LEVEL_ID_2",
            Self::NominalVoltage1 => "NOMINAL_VOLTAGE_1",
            Self::NominalVoltage2 => "NOMINAL_VOLTAGE_2",
            Self::Country1 => "COUNTRY_1",
            Self::Country2 => "COUNTRY_2",
            Self::Connected1 => "CONNECTED_1",
            Self::Connected2 => "CONNECTED_2",
            Self::SeriesResistance => "SERIES_RESISTANCE",
            Self::SeriesReactance => "SERIES_REACTANCE",
            Self::FreeProperties => "FREE_PROPERTIES",
            Self::SubstationProperties => "SUBSTATION_PROPERTIES",
        }
    }

    /// 属性类字段只能用于 PROPERTIES 规则
    pub fn is_property_field(&self) -> bool {
        matches!(self, Self::FreeProperties | Self::SubstationProperties)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| FilterError::UnknownField(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_match_serde() {
        for field in FieldType::ALL {
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(json, format!("\"{}\"", field.as_str()));
            assert_eq!(field.as_str().parse::<FieldType>().unwrap(), field);
        }
    }

    #[test]
    fn test_unknown_field() {
        let err = "WIND_SPEED".parse::<FieldType>().unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_FIELD");
    }
}
