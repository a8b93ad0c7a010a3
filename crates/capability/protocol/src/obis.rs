//! OBIS 数据行解析

/// 瞬时用电功率（kW）
pub const OBIS_CONSUMPTION: &str = "1-0:1.7.0";
/// 瞬时发电功率（kW）
pub const OBIS_PRODUCTION: &str = "1-0:2.7.0";

/// 解析 `1-0:1.7.0(00.424*kW)` 形式的数据行，返回 (OBIS 码, 数值)。
///
/// 单位后缀（`*kW`、`*W`）可有可无，数值一律按报文约定的 kW 解释。
pub fn parse_obis_line(line: &str) -> Option<(&str, f64)> {
    let (code, rest) = line.trim().split_once('(')?;
    let (value, _) = rest.split_once(')')?;
    let number = match value.split_once('*') {
        Some((number, _unit)) => number,
        None => value,
    };
    let parsed = number.trim().parse::<f64>().ok()?;
    Some((code.trim(), parsed))
}

/// 净功率（W）= (用电 - 发电) × 1000；两者都缺失时返回 None。
pub fn net_power_watts<'a, I>(lines: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut consumption_kw = None;
    let mut production_kw = None;
    for line in lines {
        match parse_obis_line(line) {
            Some((OBIS_CONSUMPTION, value)) => consumption_kw = Some(value),
            Some((OBIS_PRODUCTION, value)) => production_kw = Some(value),
            _ => {}
        }
    }
    if consumption_kw.is_none() && production_kw.is_none() {
        return None;
    }
    let consumption_w = consumption_kw.unwrap_or(0.0) * 1000.0;
    let production_w = production_kw.unwrap_or(0.0) * 1000.0;
    Some(consumption_w - production_w)
}
