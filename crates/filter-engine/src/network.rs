//! 电网设备模型
//!
//! 设备模型由外部提供（通常是网络导出的 JSON），这里只保留过滤器求值所需的属性，
//! 并在构造时建立 id 索引，供字段解析和设备查找使用。

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::FilterError;

/// 设备类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EquipmentType {
    Generator,
    Load,
    Battery,
    Line,
}

impl EquipmentType {
    pub const ALL: [EquipmentType; 4] = [Self::Generator, Self::Load, Self::Battery, Self::Line];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generator => "GENERATOR",
            Self::Load => "LOAD",
            Self::Battery => "BATTERY",
            Self::Line => "LINE",
        }
    }
}

impl fmt::Display for EquipmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EquipmentType {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| FilterError::UnknownEquipmentType(s.to_string()))
    }
}

/// 变电站
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Substation {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// ISO 国家代码，如 "FR"
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// 电压等级
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoltageLevel {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub substation_id: Option<String>,
    pub nominal_v: f64,
}

/// 注入类设备（发电机、负荷、储能）的公共部分
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Injection {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub voltage_level_id: String,
    #[serde(default = "default_connected")]
    pub connected: bool,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

fn default_connected() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnergySource {
    Hydro,
    Nuclear,
    Wind,
    Thermal,
    Solar,
    #[default]
    Other,
}

impl EnergySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hydro => "HYDRO",
            Self::Nuclear => "NUCLEAR",
            Self::Wind => "WIND",
            Self::Thermal => "THERMAL",
            Self::Solar => "SOLAR",
            Self::Other => "OTHER",
        }
    }
}

/// 发电机启动参数扩展
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorStartup {
    pub planned_active_power_set_point: f64,
    pub marginal_cost: f64,
    pub planned_outage_rate: f64,
    pub forced_outage_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Generator {
    #[serde(flatten)]
    pub injection: Injection,
    #[serde(default)]
    pub energy_source: EnergySource,
    pub min_p: f64,
    pub max_p: f64,
    pub target_p: f64,
    #[serde(default)]
    pub target_q: Option<f64>,
    #[serde(default)]
    pub target_v: Option<f64>,
    #[serde(default)]
    pub voltage_regulator_on: bool,
    #[serde(default)]
    pub rated_s: Option<f64>,
    #[serde(default)]
    pub startup: Option<GeneratorStartup>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadType {
    #[default]
    Undefined,
    Auxiliary,
    Fictitious,
}

impl LoadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Undefined => "UNDEFINED",
            Self::Auxiliary => "AUXILIARY",
            Self::Fictitious => "FICTITIOUS",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Load {
    #[serde(flatten)]
    pub injection: Injection,
    #[serde(default)]
    pub load_type: LoadType,
    pub p0: f64,
    pub q0: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Battery {
    #[serde(flatten)]
    pub injection: Injection,
    pub min_p: f64,
    pub max_p: f64,
    pub target_p: f64,
    pub target_q: f64,
}

/// 线路（两端设备）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub voltage_level_id1: String,
    pub voltage_level_id2: String,
    #[serde(default = "default_connected")]
    pub connected1: bool,
    #[serde(default = "default_connected")]
    pub connected2: bool,
    pub r: f64,
    pub x: f64,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// 对单个设备的借用视图
#[derive(Debug, Clone, Copy)]
pub enum EquipmentRef<'a> {
    Generator(&'a Generator),
    Load(&'a Load),
    Battery(&'a Battery),
    Line(&'a Line),
}

impl<'a> EquipmentRef<'a> {
    pub fn id(&self) -> &'a str {
        match self {
            Self::Generator(g) => &g.injection.id,
            Self::Load(l) => &l.injection.id,
            Self::Battery(b) => &b.injection.id,
            Self::Line(l) => &l.id,
        }
    }

    pub fn equipment_type(&self) -> EquipmentType {
        match self {
            Self::Generator(_) => EquipmentType::Generator,
            Self::Load(_) => EquipmentType::Load,
            Self::Battery(_) => EquipmentType::Battery,
            Self::Line(_) => EquipmentType::Line,
        }
    }

    /// 注入类设备的公共部分，线路返回 None
    pub fn injection(&self) -> Option<&'a Injection> {
        match self {
            Self::Generator(g) => Some(&g.injection),
            Self::Load(l) => Some(&l.injection),
            Self::Battery(b) => Some(&b.injection),
            Self::Line(_) => None,
        }
    }

    pub fn properties(&self) -> &'a BTreeMap<String, String> {
        match self {
            Self::Generator(g) => &g.injection.properties,
            Self::Load(l) => &l.injection.properties,
            Self::Battery(b) => &b.injection.properties,
            Self::Line(l) => &l.properties,
        }
    }
}

/// 网络模型的原始形态，反序列化后再建立索引
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkData {
    #[serde(default)]
    pub substations: Vec<Substation>,
    #[serde(default)]
    pub voltage_levels: Vec<VoltageLevel>,
    #[serde(default)]
    pub generators: Vec<Generator>,
    #[serde(default)]
    pub loads: Vec<Load>,
    #[serde(default)]
    pub batteries: Vec<Battery>,
    #[serde(default)]
    pub lines: Vec<Line>,
}

/// 带索引的网络模型
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "NetworkData", into = "NetworkData")]
pub struct Network {
    data: NetworkData,
    substation_index: HashMap<String, usize>,
    voltage_level_index: HashMap<String, usize>,
    equipment_index: HashMap<(EquipmentType, String), usize>,
}

impl From<NetworkData> for Network {
    fn from(data: NetworkData) -> Self {
        let substation_index = index_by(&data.substations, |s| &s.id);
        let voltage_level_index = index_by(&data.voltage_levels, |v| &v.id);

        let mut equipment_index = HashMap::new();
        for (i, g) in data.generators.iter().enumerate() {
            equipment_index.insert((EquipmentType::Generator, g.injection.id.clone()), i);
        }
        for (i, l) in data.loads.iter().enumerate() {
            equipment_index.insert((EquipmentType::Load, l.injection.id.clone()), i);
        }
        for (i, b) in data.batteries.iter().enumerate() {
            equipment_index.insert((EquipmentType::Battery, b.injection.id.clone()), i);
        }
        for (i, l) in data.lines.iter().enumerate() {
            equipment_index.insert((EquipmentType::Line, l.id.clone()), i);
        }

        Self {
            data,
            substation_index,
            voltage_level_index,
            equipment_index,
        }
    }
}

impl From<Network> for NetworkData {
    fn from(network: Network) -> Self {
        network.data
    }
}

fn index_by<T>(items: &[T], key: impl Fn(&T) -> &String) -> HashMap<String, usize> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| (key(item).clone(), i))
        .collect()
}

impl Network {
    pub fn new(data: NetworkData) -> Self {
        data.into()
    }

    /// 从 JSON 字符串加载
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn data(&self) -> &NetworkData {
        &self.data
    }

    pub fn substation(&self, id: &str) -> Option<&Substation> {
        self.substation_index
            .get(id)
            .map(|&i| &self.data.substations[i])
    }

    pub fn voltage_level(&self, id: &str) -> Option<&VoltageLevel> {
        self.voltage_level_index
            .get(id)
            .map(|&i| &self.data.voltage_levels[i])
    }

    /// 按类型和 id 获取设备
    pub fn equipment(&self, equipment_type: EquipmentType, id: &str) -> Option<EquipmentRef<'_>> {
        let &i = self.equipment_index.get(&(equipment_type, id.to_string()))?;
        Some(match equipment_type {
            EquipmentType::Generator => EquipmentRef::Generator(&self.data.generators[i]),
            EquipmentType::Load => EquipmentRef::Load(&self.data.loads[i]),
            EquipmentType::Battery => EquipmentRef::Battery(&self.data.batteries[i]),
            EquipmentType::Line => EquipmentRef::Line(&self.data.lines[i]),
        })
    }

    /// 某类型的全部设备，保持模型中的顺序
    pub fn equipments(&self, equipment_type: EquipmentType) -> Vec<EquipmentRef<'_>> {
        match equipment_type {
            EquipmentType::Generator => self
                .data
                .generators
                .iter()
                .map(EquipmentRef::Generator)
                .collect(),
            EquipmentType::Load => self.data.loads.iter().map(EquipmentRef::Load).collect(),
            EquipmentType::Battery => self
                .data
                .batteries
                .iter()
                .map(EquipmentRef::Battery)
                .collect(),
            EquipmentType::Line => self.data.lines.iter().map(EquipmentRef::Line).collect(),
        }
    }
}
