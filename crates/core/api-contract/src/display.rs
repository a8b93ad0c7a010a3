use serde::{Deserialize, Serialize};

/// 显示屏推送体：单帧。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePayload {
    pub frames: Vec<Frame>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub text: String,
    pub icon: u32,
    pub index: u32,
}

impl FramePayload {
    pub fn single(text: impl Into<String>, icon: u32) -> Self {
        Self {
            frames: vec![Frame {
                text: text.into(),
                icon,
                index: 0,
            }],
        }
    }
}
