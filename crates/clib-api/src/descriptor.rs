//! Device capability descriptors
//!
//! The server manages exactly one device. Which descriptor it advertises
//! depends on the protocol version negotiated by the client.

use serde::{Deserialize, Serialize};

/// Protocol version that introduced `ScalarCmd`
pub const SCALAR_MESSAGE_VERSION: u32 = 3;

pub const DEVICE_NAME: &str = "Clib";
pub const DEVICE_INDEX: u32 = 0;
/// Distinct non-zero power steps the device supports
pub const STEP_COUNT: u32 = 126;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActuatorType {
    Vibrate,
    Rotate,
    Oscillate,
    Constrict,
    Inflate,
    Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceDescriptor {
    pub device_name: String,
    pub device_index: u32,
    pub device_messages: DeviceMessages,
}

/// Commands the device accepts, per descriptor generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeviceMessages {
    Scalar(ScalarMessages),
    Legacy(LegacyMessages),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScalarMessages {
    pub scalar_cmd: Vec<ScalarFeature>,
    pub stop_device_cmd: NoAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LegacyMessages {
    pub stop_device_cmd: NoAttributes,
    pub vibrate_cmd: VibrateAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScalarFeature {
    pub feature_descriptor: String,
    pub step_count: u32,
    pub actuator_type: ActuatorType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VibrateAttributes {
    pub feature_count: u32,
    pub step_count: Vec<u32>,
}

/// Serializes as `{}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoAttributes {}

impl DeviceDescriptor {
    /// Multi-actuator descriptor for protocol version 3
    pub fn scalar() -> Self {
        Self {
            device_name: DEVICE_NAME.to_string(),
            device_index: DEVICE_INDEX,
            device_messages: DeviceMessages::Scalar(ScalarMessages {
                scalar_cmd: vec![ScalarFeature {
                    feature_descriptor: "Test Vibrator".to_string(),
                    step_count: STEP_COUNT,
                    actuator_type: ActuatorType::Vibrate,
                }],
                stop_device_cmd: NoAttributes {},
            }),
        }
    }

    /// Single-vibrator descriptor for older clients
    pub fn legacy() -> Self {
        Self {
            device_name: DEVICE_NAME.to_string(),
            device_index: DEVICE_INDEX,
            device_messages: DeviceMessages::Legacy(LegacyMessages {
                stop_device_cmd: NoAttributes {},
                vibrate_cmd: VibrateAttributes {
                    feature_count: 1,
                    step_count: vec![STEP_COUNT],
                },
            }),
        }
    }
}

/// Descriptor advertised for a negotiated protocol version
pub fn descriptor_for_version(message_version: u32) -> DeviceDescriptor {
    if message_version == SCALAR_MESSAGE_VERSION {
        DeviceDescriptor::scalar()
    } else {
        DeviceDescriptor::legacy()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_scalar_descriptor_json() {
        assert_eq!(
            serde_json::to_string(&DeviceDescriptor::scalar()).unwrap(),
            r#"{"DeviceName":"Clib","DeviceIndex":0,"DeviceMessages":{"ScalarCmd":[{"FeatureDescriptor":"Test Vibrator","StepCount":126,"ActuatorType":"Vibrate"}],"StopDeviceCmd":{}}}"#
        );
    }

    #[test]
    fn test_legacy_descriptor_json() {
        assert_eq!(
            serde_json::to_value(DeviceDescriptor::legacy()).unwrap(),
            json!({
                "DeviceName": "Clib",
                "DeviceIndex": 0,
                "DeviceMessages": {
                    "StopDeviceCmd": {},
                    "VibrateCmd": {"FeatureCount": 1, "StepCount": [126]}
                }
            })
        );
    }

    #[test]
    fn test_selection_by_version() {
        assert_eq!(descriptor_for_version(3), DeviceDescriptor::scalar());
        for version in [0, 1, 2, 4] {
            assert_eq!(descriptor_for_version(version), DeviceDescriptor::legacy());
        }
    }

    #[test]
    fn test_descriptor_parses_back() {
        let value = serde_json::to_value(DeviceDescriptor::legacy()).unwrap();
        let parsed: DeviceDescriptor = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, DeviceDescriptor::legacy());
    }
}
