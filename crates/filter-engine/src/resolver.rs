//! 字段解析
//!
//! 将 (字段, 设备) 映射为字符串形式的属性值。数值、布尔、枚举都先转换为规范字符串，
//! 这样 STRING / NUMBER / ENUM / BOOLEAN 规则共用同一条解析路径。

use crate::error::{FilterError, Result};
use crate::fields::FieldType;
use crate::network::{
    Battery, EquipmentRef, EquipmentType, Generator, GeneratorStartup, Injection, Line, Load,
    Network, Substation, VoltageLevel,
};

/// 字段解析器
///
/// 网络模型 [`Network`] 是默认实现；测试中可替换为自定义实现。
pub trait FieldResolver: Send + Sync {
    /// 解析标量字段
    fn field_value(&self, field: FieldType, equipment: EquipmentRef<'_>) -> Result<String>;

    /// 解析属性字段（FREE_PROPERTIES / SUBSTATION_PROPERTIES），属性不存在时返回 None
    fn property_value(
        &self,
        field: FieldType,
        property_name: &str,
        equipment: EquipmentRef<'_>,
    ) -> Result<Option<String>>;
}

/// 数值的规范字符串形式（NaN 输出为 "NaN"）
pub fn format_number(value: f64) -> String {
    value.to_string()
}

fn optional_number(value: Option<f64>) -> String {
    format_number(value.unwrap_or(f64::NAN))
}

fn not_applicable(field: FieldType, equipment_type: EquipmentType) -> FilterError {
    FilterError::FieldNotApplicable {
        field: field.to_string(),
        equipment_type: equipment_type.to_string(),
    }
}

impl Network {
    fn require_voltage_level(&self, id: &str) -> Result<&VoltageLevel> {
        self.voltage_level(id)
            .ok_or_else(|| FilterError::EquipmentNotFound {
                equipment_type: "VOLTAGE_LEVEL".to_string(),
                id: id.to_string(),
            })
    }

    fn require_substation(&self, id: &str) -> Result<&Substation> {
        self.substation(id)
            .ok_or_else(|| FilterError::EquipmentNotFound {
                equipment_type: "SUBSTATION".to_string(),
                id: id.to_string(),
            })
    }

    /// 电压等级所在的变电站；未关联变电站时为 None，引用的变电站不存在时报错
    fn substation_of(&self, voltage_level_id: &str) -> Result<Option<&Substation>> {
        let voltage_level = self.require_voltage_level(voltage_level_id)?;
        voltage_level
            .substation_id
            .as_deref()
            .map(|id| self.require_substation(id))
            .transpose()
    }

    /// 电压等级所在变电站的国家，未关联国家时为空字符串
    fn country_of(&self, voltage_level_id: &str) -> Result<String> {
        let country = self
            .substation_of(voltage_level_id)?
            .and_then(|s| s.country.clone());
        Ok(country.unwrap_or_default())
    }

    fn nominal_voltage_of(&self, voltage_level_id: &str) -> Result<String> {
        let voltage_level = self.require_voltage_level(voltage_level_id)?;
        Ok(format_number(voltage_level.nominal_v))
    }

    fn injection_field(
        &self,
        field: FieldType,
        injection: &Injection,
        equipment_type: EquipmentType,
    ) -> Result<String> {
        match field {
            FieldType::Id => Ok(injection.id.clone()),
            FieldType::Name => Ok(injection
                .name
                .clone()
                .unwrap_or_else(|| injection.id.clone())),
            FieldType::Country => self.country_of(&injection.voltage_level_id),
            FieldType::NominalVoltage => self.nominal_voltage_of(&injection.voltage_level_id),
            FieldType::VoltageLevelId => Ok(injection.voltage_level_id.clone()),
            FieldType::Connected => Ok(injection.connected.to_string()),
            _ => Err(not_applicable(field, equipment_type)),
        }
    }

    fn generator_field(&self, field: FieldType, generator: &Generator) -> Result<String> {
        // 启动参数扩展缺失时按 NaN 处理，而不是报错
        let startup = |get: fn(&GeneratorStartup) -> f64| {
            optional_number(generator.startup.as_ref().map(get))
        };

        match field {
            FieldType::EnergySource => Ok(generator.energy_source.as_str().to_string()),
            FieldType::MinP => Ok(format_number(generator.min_p)),
            FieldType::MaxP => Ok(format_number(generator.max_p)),
            FieldType::TargetP => Ok(format_number(generator.target_p)),
            FieldType::TargetQ => Ok(optional_number(generator.target_q)),
            FieldType::TargetV => Ok(optional_number(generator.target_v)),
            FieldType::VoltageRegulatorOn => Ok(generator.voltage_regulator_on.to_string()),
            FieldType::RatedS => Ok(optional_number(generator.rated_s)),
            FieldType::PlannedActivePowerSetPoint => {
                Ok(startup(|s| s.planned_active_power_set_point))
            }
            FieldType::MarginalCost => Ok(startup(|s| s.marginal_cost)),
            FieldType::PlannedOutageRate => Ok(startup(|s| s.planned_outage_rate)),
            FieldType::ForcedOutageRate => Ok(startup(|s| s.forced_outage_rate)),
            _ => self.injection_field(field, &generator.injection, EquipmentType::Generator),
        }
    }

    fn load_field(&self, field: FieldType, load: &Load) -> Result<String> {
        match field {
            FieldType::LoadType => Ok(load.load_type.as_str().to_string()),
            FieldType::P0 => Ok(format_number(load.p0)),
            FieldType::Q0 => Ok(format_number(load.q0)),
            _ => self.injection_field(field, &load.injection, EquipmentType::Load),
        }
    }

    fn battery_field(&self, field: FieldType, battery: &Battery) -> Result<String> {
        match field {
            FieldType::MinP => Ok(format_number(battery.min_p)),
            FieldType::MaxP => Ok(format_number(battery.max_p)),
            FieldType::TargetP => Ok(format_number(battery.target_p)),
            FieldType::TargetQ => Ok(format_number(battery.target_q)),
            _ => self.injection_field(field, &battery.injection, EquipmentType::Battery),
        }
    }

    fn line_field(&self, field: FieldType, line: &Line) -> Result<String> {
        match field {
            FieldType::Id => Ok(line.id.clone()),
            FieldType::Name => Ok(line.name.clone().unwrap_or_else(|| line.id.clone())),
            FieldType::VoltageLevelId1 => Ok(line.voltage_level_id1.clone()),
            FieldType::VoltageLevelId2 => Ok(line.voltage_level_id2.clone()),
            FieldType::NominalVoltage1 => self.nominal_voltage_of(&line.voltage_level_id1),
            FieldType::NominalVoltage2 => self.nominal_voltage_of(&line.voltage_level_id2),
            FieldType::Country1 => self.country_of(&line.voltage_level_id1),
            FieldType::Country2 => self.country_of(&line.voltage_level_id2),
            FieldType::Connected1 => Ok(line.connected1.to_string()),
            FieldType::Connected2 => Ok(line.connected2.to_string()),
            FieldType::SeriesResistance => Ok(format_number(line.r)),
            FieldType::SeriesReactance => Ok(format_number(line.x)),
            _ => Err(not_applicable(field, EquipmentType::Line)),
        }
    }
}

impl FieldResolver for Network {
    fn field_value(&self, field: FieldType, equipment: EquipmentRef<'_>) -> Result<String> {
        match equipment {
            EquipmentRef::Generator(g) => self.generator_field(field, g),
            EquipmentRef::Load(l) => self.load_field(field, l),
            EquipmentRef::Battery(b) => self.battery_field(field, b),
            EquipmentRef::Line(l) => self.line_field(field, l),
        }
    }

    fn property_value(
        &self,
        field: FieldType,
        property_name: &str,
        equipment: EquipmentRef<'_>,
    ) -> Result<Option<String>> {
        match field {
            FieldType::FreeProperties => Ok(equipment.properties().get(property_name).cloned()),
            FieldType::SubstationProperties => {
                let injection = equipment
                    .injection()
                    .ok_or_else(|| not_applicable(field, equipment.equipment_type()))?;
                let value = self
                    .substation_of(&injection.voltage_level_id)?
                    .and_then(|s| s.properties.get(property_name).cloned());
                Ok(value)
            }
            _ => Err(not_applicable(field, equipment.equipment_type())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkData;
    use std::collections::BTreeMap;

    fn injection(id: &str, voltage_level_id: &str) -> Injection {
        Injection {
            id: id.to_string(),
            name: None,
            voltage_level_id: voltage_level_id.to_string(),
            connected: true,
            properties: BTreeMap::from([("owner".to_string(), "RTE".to_string())]),
        }
    }

    fn sample_network() -> Network {
        Network::new(NetworkData {
            substations: vec![
                Substation {
                    id: "S_FR".to_string(),
                    country: Some("FR".to_string()),
                    properties: BTreeMap::from([("region".to_string(), "north".to_string())]),
                    ..Default::default()
                },
                Substation {
                    id: "S_NONE".to_string(),
                    ..Default::default()
                },
            ],
            voltage_levels: vec![
                VoltageLevel {
                    id: "VL400".to_string(),
                    substation_id: Some("S_FR".to_string()),
                    nominal_v: 400.0,
                    ..Default::default()
                },
                VoltageLevel {
                    id: "VL63".to_string(),
                    substation_id: Some("S_NONE".to_string()),
                    nominal_v: 63.0,
                    ..Default::default()
                },
                VoltageLevel {
                    id: "VL_DANGLING".to_string(),
                    substation_id: Some("S_MISSING".to_string()),
                    nominal_v: 225.0,
                    ..Default::default()
                },
                VoltageLevel {
                    id: "VL_DETACHED".to_string(),
                    nominal_v: 20.0,
                    ..Default::default()
                },
            ],
            generators: vec![
                Generator {
                    injection: injection("G1", "VL400"),
                    target_p: 120.0,
                    max_p: 150.5,
                    startup: Some(GeneratorStartup {
                        marginal_cost: 42.0,
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                Generator {
                    injection: injection("G2", "VL63"),
                    ..Default::default()
                },
                Generator {
                    injection: injection("G_ORPHAN", "VL_MISSING"),
                    ..Default::default()
                },
                Generator {
                    injection: injection("G_DANGLING", "VL_DANGLING"),
                    ..Default::default()
                },
                Generator {
                    injection: injection("G_DETACHED", "VL_DETACHED"),
                    ..Default::default()
                },
            ],
            lines: vec![Line {
                id: "LINE1".to_string(),
                voltage_level_id1: "VL400".to_string(),
                voltage_level_id2: "VL63".to_string(),
                connected1: true,
                connected2: false,
                r: 0.5,
                x: 12.0,
                ..Default::default()
            }],
            ..Default::default()
        })
    }

    fn generator<'a>(network: &'a Network, id: &str) -> EquipmentRef<'a> {
        network.equipment(EquipmentType::Generator, id).unwrap()
    }

    #[test]
    fn test_injection_fields() {
        let network = sample_network();
        let g1 = generator(&network, "G1");

        assert_eq!(network.field_value(FieldType::Id, g1).unwrap(), "G1");
        assert_eq!(network.field_value(FieldType::Name, g1).unwrap(), "G1");
        assert_eq!(network.field_value(FieldType::Country, g1).unwrap(), "FR");
        assert_eq!(
            network.field_value(FieldType::NominalVoltage, g1).unwrap(),
            "400"
        );
        assert_eq!(
            network.field_value(FieldType::VoltageLevelId, g1).unwrap(),
            "VL400"
        );
        assert_eq!(network.field_value(FieldType::Connected, g1).unwrap(), "true");
    }

    #[test]
    fn test_country_empty_when_absent() {
        let network = sample_network();
        let g2 = generator(&network, "G2");
        assert_eq!(network.field_value(FieldType::Country, g2).unwrap(), "");
    }

    #[test]
    fn test_generator_numeric_fields() {
        let network = sample_network();
        let g1 = generator(&network, "G1");

        assert_eq!(network.field_value(FieldType::TargetP, g1).unwrap(), "120");
        assert_eq!(network.field_value(FieldType::MaxP, g1).unwrap(), "150.5");
        assert_eq!(network.field_value(FieldType::RatedS, g1).unwrap(), "NaN");
        assert_eq!(
            network.field_value(FieldType::EnergySource, g1).unwrap(),
            "OTHER"
        );
        assert_eq!(
            network.field_value(FieldType::MarginalCost, g1).unwrap(),
            "42"
        );
    }

    #[test]
    fn test_startup_fields_nan_without_extension() {
        let network = sample_network();
        let g2 = generator(&network, "G2");

        for field in [
            FieldType::PlannedActivePowerSetPoint,
            FieldType::MarginalCost,
            FieldType::PlannedOutageRate,
            FieldType::ForcedOutageRate,
        ] {
            let value = network.field_value(field, g2).unwrap();
            assert!(value.parse::<f64>().unwrap().is_nan(), "{field} = {value}");
        }
    }

    #[test]
    fn test_field_not_applicable() {
        let network = sample_network();
        let g1 = generator(&network, "G1");

        let err = network.field_value(FieldType::LoadType, g1).unwrap_err();
        assert_eq!(err.code(), "FIELD_NOT_APPLICABLE");

        let line = network.equipment(EquipmentType::Line, "LINE1").unwrap();
        let err = network.field_value(FieldType::Country, line).unwrap_err();
        assert_eq!(err.code(), "FIELD_NOT_APPLICABLE");
    }

    #[test]
    fn test_missing_voltage_level() {
        let network = sample_network();
        let orphan = generator(&network, "G_ORPHAN");
        let err = network.field_value(FieldType::Country, orphan).unwrap_err();
        assert_eq!(err.code(), "EQUIPMENT_NOT_FOUND");
    }

    #[test]
    fn test_missing_substation() {
        let network = sample_network();
        let dangling = generator(&network, "G_DANGLING");

        let err = network.field_value(FieldType::Country, dangling).unwrap_err();
        assert_eq!(err.code(), "EQUIPMENT_NOT_FOUND");
        assert!(err.to_string().contains("S_MISSING"));

        let err = network
            .property_value(FieldType::SubstationProperties, "region", dangling)
            .unwrap_err();
        assert_eq!(err.code(), "EQUIPMENT_NOT_FOUND");

        // 电压等级未关联变电站不是错误
        let detached = generator(&network, "G_DETACHED");
        assert_eq!(network.field_value(FieldType::Country, detached).unwrap(), "");
        assert!(
            network
                .property_value(FieldType::SubstationProperties, "region", detached)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_line_sides() {
        let network = sample_network();
        let line = network.equipment(EquipmentType::Line, "LINE1").unwrap();

        assert_eq!(network.field_value(FieldType::Country1, line).unwrap(), "FR");
        assert_eq!(network.field_value(FieldType::Country2, line).unwrap(), "");
        assert_eq!(
            network.field_value(FieldType::NominalVoltage2, line).unwrap(),
            "63"
        );
        assert_eq!(
            network.field_value(FieldType::Connected2, line).unwrap(),
            "false"
        );
        assert_eq!(
            network.field_value(FieldType::SeriesReactance, line).unwrap(),
            "12"
        );
    }

    #[test]
    fn test_property_values() {
        let network = sample_network();
        let g1 = generator(&network, "G1");

        assert_eq!(
            network
                .property_value(FieldType::FreeProperties, "owner", g1)
                .unwrap()
                .as_deref(),
            Some("RTE")
        );
        assert_eq!(
            network
                .property_value(FieldType::SubstationProperties, "region", g1)
                .unwrap()
                .as_deref(),
            Some("north")
        );
        assert!(
            network
                .property_value(FieldType::FreeProperties, "missing", g1)
                .unwrap()
                .is_none()
        );
        assert!(network.property_value(FieldType::TargetP, "x", g1).is_err());
    }
}
