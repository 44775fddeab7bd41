fn main() {
    println!("Run `cargo test -p wire-compat` to check the dashboard wire format.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use bizosaas_protocol::{ControlMessage, InboundMessage, stamp_outbound};

    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Decodes a fixture, re-encodes it and expects the same JSON back.
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  wire: {fixture}\n  ours: {reserialized}"
        );
        parsed
    }

    // --- Inbound pushes ---

    #[test]
    fn fixture_metrics_update() {
        let msg: InboundMessage = roundtrip_test("metrics_update.json");
        assert_eq!(msg.msg_type, "metrics_update");
        assert_eq!(msg.data["active_leads"], 342);
        assert!(msg.agent_id.is_none());
    }

    #[test]
    fn fixture_agent_status() {
        let msg: InboundMessage = roundtrip_test("agent_status.json");
        assert_eq!(msg.agent_id_str(), Some("seo-agent-1"));
        assert_eq!(msg.data["status"], "running");
    }

    #[test]
    fn fixture_inbound_extra_fields_survive() {
        let msg: InboundMessage = roundtrip_test("inbound_extra_fields.json");
        assert_eq!(msg.extra["workflow_id"], "wf-77");
        assert_eq!(msg.extra["step"], 3);
        assert!(msg.data.is_null());
    }

    #[test]
    fn fixture_inbound_numeric_timestamp() {
        let msg: InboundMessage = roundtrip_test("inbound_numeric_timestamp.json");
        assert_eq!(msg.msg_type, "metrics_update");
        assert_eq!(msg.timestamp, Some(serde_json::json!(1700000000000u64)));
        assert_eq!(msg.agent_id, Some(serde_json::json!(42)));
        assert!(msg.timestamp_str().is_none());
    }

    #[test]
    fn fixture_inbound_minimal_defaults_data_to_null() {
        let fixture = load_fixture("inbound_minimal.json");
        let msg: InboundMessage = serde_json::from_value(fixture).unwrap();
        assert_eq!(msg.msg_type, "heartbeat");
        assert!(msg.data.is_null());
        assert!(msg.timestamp.is_none());
    }

    #[test]
    fn inbound_without_type_is_rejected() {
        let bad = serde_json::json!({"data": {"revenue": 1}});
        assert!(serde_json::from_value::<InboundMessage>(bad).is_err());
    }

    // --- Control messages ---

    #[test]
    fn fixture_dashboard_connect() {
        let msg: ControlMessage = roundtrip_test("dashboard_connect.json");
        assert_eq!(msg, ControlMessage::DashboardConnect);
    }

    #[test]
    fn fixture_agent_monitor_connect() {
        let msg: ControlMessage = roundtrip_test("agent_monitor_connect.json");
        assert_eq!(msg, ControlMessage::AgentMonitorConnect);
    }

    #[test]
    fn fixture_request_update() {
        let msg: ControlMessage = roundtrip_test("request_update.json");
        assert_eq!(
            msg,
            ControlMessage::RequestUpdate {
                update_type: "leads".into()
            }
        );
    }

    // --- Outbound stamping ---

    #[test]
    fn fixture_outbound_request_update() {
        use chrono::TimeZone;

        let now = chrono::Utc
            .with_ymd_and_hms(2024, 3, 1, 12, 30, 5)
            .unwrap();
        let frame = stamp_outbound(
            &ControlMessage::RequestUpdate {
                update_type: "leads".into(),
            },
            now,
        )
        .unwrap();
        let sent: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(sent, load_fixture("outbound_request_update.json"));
    }
}
