use api_contract::display::FramePayload;
use domain::Reading;

/// 取电图标。
pub const ICON_CONSUMING: u32 = 26337;
/// 回馈图标。
pub const ICON_PRODUCING: u32 = 54077;
/// 数据过期图标。
pub const ICON_STALE: u32 = 1059;

pub const STALE_TEXT: &str = "-- W";

/// 超过该值（取整后的绝对值）改用 kW 显示。
const KILOWATT_THRESHOLD: f64 = 10_000.0;

/// 先取整到瓦（四舍五入，远离零），再决定文本与图标。
pub fn format_power(watts: f64) -> (String, u32) {
    let rounded = watts.round();
    let icon = if rounded < 0.0 {
        ICON_PRODUCING
    } else {
        ICON_CONSUMING
    };
    let text = if rounded.abs() >= KILOWATT_THRESHOLD {
        format!("{:.1} kW", rounded / 1000.0)
    } else {
        // -0.0 显示为 0
        format!("{} W", rounded as i64)
    };
    (text, icon)
}

pub fn reading_frame(reading: &Reading) -> FramePayload {
    let (text, icon) = format_power(reading.power_watts());
    FramePayload::single(text, icon)
}

pub fn stale_frame() -> FramePayload {
    FramePayload::single(STALE_TEXT, ICON_STALE)
}
