/// 单次功率采样：流水线中流动的不可变数据单元。
///
/// `power_watts` 为正表示从电网取电，为负表示向电网回馈。
/// `timestamp` 由协议提供（不透明字符串），并非所有数据源都会携带。
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    power_watts: f64,
    timestamp: Option<String>,
}

impl Reading {
    pub fn new(power_watts: f64, timestamp: Option<String>) -> Self {
        Self {
            power_watts,
            timestamp,
        }
    }

    pub fn power_watts(&self) -> f64 {
        self.power_watts
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    /// 是否处于回馈（发电）状态。
    pub fn is_producing(&self) -> bool {
        self.power_watts < 0.0
    }
}
