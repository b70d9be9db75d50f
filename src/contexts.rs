//! Best-effort device context collection.

use crate::constants::USER_AGENT;
use crate::protocol::DeviceInfo;

/// Collects what the current platform exposes about the device.
///
/// Fields with no native source stay unset and are omitted from the
/// payload.
pub(crate) fn device_info() -> DeviceInfo {
    DeviceInfo {
        os_name: Some(std::env::consts::OS.to_string()),
        family: Some(std::env::consts::ARCH.to_string()),
        user_agent: Some(USER_AGENT.to_string()),
        hardware_concurrency: std::thread::available_parallelism()
            .ok()
            .map(|n| n.get() as u32),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_fields_are_omitted() {
        let info = device_info();
        assert!(info.os_name.is_some());
        let value = serde_json::to_value(&info).unwrap();
        let object = value.as_object().unwrap();
        assert!(object.contains_key("osName"));
        assert!(object.contains_key("userAgent"));
        assert!(!object.contains_key("screenWidth"));
        assert!(!object.contains_key("jsHeapSizeLimit"));
    }
}
