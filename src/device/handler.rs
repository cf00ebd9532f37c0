//! PDU dispatch
//!
//! Pure request processing for one device: community check, GET/GETNEXT/
//! GETBULK/SET against the profile tree with values run through the
//! simulator, and version-correct error reporting (v2c exception markers
//! in varbinds, v1 error-status/error-index). No I/O happens here; the
//! actor owns sockets and timers.

use tracing::warn;

use crate::profile::Profile;
use crate::sim::{simulate, SimContext};
use crate::snmp::{ErrorStatus, Oid, Pdu, SnmpMessage, SnmpValue, SnmpVersion, VarBind};

use super::bulk::{process_bulk, BulkError};
use super::state::DeviceState;
use super::upgrade::{SetAction, UpgradeState};

/// Handler-facing limits lifted from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct HandlerLimits {
    pub max_response_bytes: usize,
    pub max_filename_length: usize,
}

impl Default for HandlerLimits {
    fn default() -> Self {
        Self {
            max_response_bytes: 1400,
            max_filename_length: 64,
        }
    }
}

/// Outcome of processing one request.
#[derive(Debug)]
pub struct HandlerResult {
    pub response: Option<SnmpMessage>,
    /// Follow-up work a SET asked for (the actor arms the timers).
    pub actions: Vec<SetAction>,
}

impl HandlerResult {
    fn drop_packet() -> Self {
        Self {
            response: None,
            actions: Vec::new(),
        }
    }

    fn respond(response: SnmpMessage) -> Self {
        Self {
            response: Some(response),
            actions: Vec::new(),
        }
    }
}

/// Process one decoded message against the device.
pub fn handle_message(
    message: &SnmpMessage,
    state: &mut DeviceState,
    profile: &Profile,
    sim: &SimContext<'_>,
    limits: &HandlerLimits,
) -> HandlerResult {
    // Community mismatch: count it and stay silent.
    if message.community != state.community {
        state.stats.auth_failures += 1;
        return HandlerResult::drop_packet();
    }

    let result = match &message.pdu {
        Pdu::GetRequest { bindings, .. } => handle_get(message, bindings, state, profile, sim),
        Pdu::GetNextRequest { bindings, .. } => {
            handle_get_next(message, bindings, state, profile, sim)
        }
        Pdu::GetBulkRequest {
            non_repeaters,
            max_repetitions,
            bindings,
            ..
        } => handle_get_bulk(
            message,
            *non_repeaters,
            *max_repetitions,
            bindings,
            state,
            profile,
            sim,
            limits,
        ),
        Pdu::SetRequest { bindings, .. } => handle_set(message, bindings, state, limits),
        // Agents do not accept response PDUs.
        Pdu::Response { .. } => HandlerResult::drop_packet(),
    };

    if let Some(response) = &result.response {
        if let Pdu::Response { error_status, .. } = &response.pdu {
            if *error_status != ErrorStatus::NoError {
                state.stats.error_responses += 1;
            }
        }
    }
    result
}

/// Resolve the live value for an OID present in the profile, with the
/// writable upgrade cells overlaid on top of the walk data.
fn resolve_value(
    oid: &Oid,
    state: &mut DeviceState,
    profile: &Profile,
    sim: &SimContext<'_>,
) -> Option<SnmpValue> {
    if UpgradeState::covers(oid) {
        return state.upgrade.get(oid);
    }
    let entry = profile.get(oid)?.clone();
    Some(simulate(&entry, oid, state, sim))
}

/// v2c marker for a missing OID: the object exists but the instance does
/// not when siblings live under the same column.
fn missing_marker(profile: &Profile, oid: &Oid) -> SnmpValue {
    match oid.parent() {
        Some(parent) if profile.tree().has_children(&parent) => SnmpValue::NoSuchInstance,
        _ => SnmpValue::NoSuchObject,
    }
}

fn handle_get(
    message: &SnmpMessage,
    bindings: &[VarBind],
    state: &mut DeviceState,
    profile: &Profile,
    sim: &SimContext<'_>,
) -> HandlerResult {
    let mut results = Vec::with_capacity(bindings.len());
    for (i, binding) in bindings.iter().enumerate() {
        match resolve_value(&binding.oid, state, profile, sim) {
            Some(value) => results.push(VarBind::new(binding.oid.clone(), value)),
            None => match message.version {
                SnmpVersion::V2c => {
                    let marker = missing_marker(profile, &binding.oid);
                    results.push(VarBind::new(binding.oid.clone(), marker));
                }
                SnmpVersion::V1 => {
                    return HandlerResult::respond(SnmpMessage::error_response(
                        message,
                        ErrorStatus::NoSuchName,
                        (i + 1) as u32,
                    ));
                }
            },
        }
    }
    HandlerResult::respond(SnmpMessage::response_to(message, results))
}

fn handle_get_next(
    message: &SnmpMessage,
    bindings: &[VarBind],
    state: &mut DeviceState,
    profile: &Profile,
    sim: &SimContext<'_>,
) -> HandlerResult {
    let mut results = Vec::with_capacity(bindings.len());
    for (i, binding) in bindings.iter().enumerate() {
        let successor = profile
            .tree()
            .bulk_walk(&binding.oid, 1)
            .first()
            .map(|(oid, _)| (*oid).clone());
        match successor {
            Some(next) => {
                let value = resolve_value(&next, state, profile, sim).unwrap_or(SnmpValue::Null);
                results.push(VarBind::new(next, value));
            }
            None => match message.version {
                SnmpVersion::V2c => {
                    results.push(VarBind::new(binding.oid.clone(), SnmpValue::EndOfMibView));
                }
                SnmpVersion::V1 => {
                    return HandlerResult::respond(SnmpMessage::error_response(
                        message,
                        ErrorStatus::NoSuchName,
                        (i + 1) as u32,
                    ));
                }
            },
        }
    }
    HandlerResult::respond(SnmpMessage::response_to(message, results))
}

#[allow(clippy::too_many_arguments)]
fn handle_get_bulk(
    message: &SnmpMessage,
    non_repeaters: u32,
    max_repetitions: u32,
    bindings: &[VarBind],
    state: &mut DeviceState,
    profile: &Profile,
    sim: &SimContext<'_>,
    limits: &HandlerLimits,
) -> HandlerResult {
    if message.version == SnmpVersion::V1 {
        return HandlerResult::respond(SnmpMessage::error_response(
            message,
            ErrorStatus::GenErr,
            0,
        ));
    }

    let outcome = process_bulk(
        profile.tree(),
        non_repeaters as i64,
        max_repetitions as i64,
        bindings,
        limits.max_response_bytes,
        |oid, entry| {
            if UpgradeState::covers(oid) {
                state
                    .upgrade
                    .get(oid)
                    .unwrap_or_else(|| SnmpValue::Null)
            } else {
                simulate(entry, oid, state, sim)
            }
        },
    );

    match outcome {
        Ok(results) => HandlerResult::respond(SnmpMessage::response_to(message, results)),
        Err(BulkError::TooBig) => HandlerResult::respond(SnmpMessage::error_response(
            message,
            ErrorStatus::TooBig,
            0,
        )),
        Err(error) => {
            warn!(port = state.port, %error, "rejected GETBULK parameters");
            HandlerResult::respond(SnmpMessage::error_response(message, ErrorStatus::GenErr, 0))
        }
    }
}

fn handle_set(
    message: &SnmpMessage,
    bindings: &[VarBind],
    state: &mut DeviceState,
    limits: &HandlerLimits,
) -> HandlerResult {
    let mut actions = Vec::new();
    for (i, binding) in bindings.iter().enumerate() {
        let outcome = if UpgradeState::covers(&binding.oid) {
            state
                .upgrade
                .set(&binding.oid, &binding.value, limits.max_filename_length)
        } else {
            // Everything outside the upgrade group is read-only.
            Err(ErrorStatus::NotWritable)
        };
        match outcome {
            Ok(SetAction::None) => {}
            Ok(action) => actions.push(action),
            Err(status) => {
                return HandlerResult::respond(SnmpMessage::error_response(
                    message,
                    status,
                    (i + 1) as u32,
                ));
            }
        }
    }

    let mut result =
        HandlerResult::respond(SnmpMessage::response_to(message, bindings.to_vec()));
    result.actions = actions;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceType, JitterConfig};
    use crate::profile::parse_walk_text;
    use chrono::NaiveDate;

    fn oid(s: &str) -> Oid {
        s.parse().unwrap()
    }

    fn profile() -> Profile {
        Profile::from_walk(
            DeviceType::CableModem,
            parse_walk_text(concat!(
                "SNMPv2-MIB::sysDescr.0 = STRING: \"Motorola SB6183\"\n",
                "SNMPv2-MIB::sysUpTime.0 = Timeticks: (100) 0:00:01.00\n",
                "IF-MIB::ifIndex.1 = INTEGER: 1\n",
                "IF-MIB::ifIndex.2 = INTEGER: 2\n",
                "IF-MIB::ifIndex.3 = INTEGER: 3\n",
            )),
            None,
        )
    }

    fn state() -> DeviceState {
        DeviceState::new(30001, DeviceType::CableModem, "public".into(), 5)
    }

    fn request(version: SnmpVersion, pdu: Pdu) -> SnmpMessage {
        SnmpMessage {
            version,
            community: "public".to_string(),
            pdu,
        }
    }

    fn run(message: &SnmpMessage, state: &mut DeviceState) -> HandlerResult {
        let jitter = JitterConfig::default();
        let sim = SimContext {
            now: NaiveDate::from_ymd_opt(2025, 6, 11)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            jitter: &jitter,
        };
        let profile = profile();
        handle_message(message, state, &profile, &sim, &HandlerLimits::default())
    }

    fn response_bindings(result: &HandlerResult) -> &[VarBind] {
        match &result.response.as_ref().unwrap().pdu {
            Pdu::Response { bindings, .. } => bindings,
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_get_returns_walk_value() {
        let mut state = state();
        let message = request(
            SnmpVersion::V2c,
            Pdu::GetRequest {
                request_id: 7,
                bindings: vec![VarBind::null(oid("1.3.6.1.2.1.1.1.0"))],
            },
        );
        let result = run(&message, &mut state);
        let bindings = response_bindings(&result);
        assert_eq!(
            bindings[0].value,
            SnmpValue::OctetString(b"Motorola SB6183".to_vec())
        );
        assert_eq!(result.response.as_ref().unwrap().pdu.request_id(), 7);
    }

    #[test]
    fn test_bad_community_is_silently_dropped() {
        let mut state = state();
        let mut message = request(
            SnmpVersion::V2c,
            Pdu::GetRequest {
                request_id: 1,
                bindings: vec![VarBind::null(oid("1.3.6.1.2.1.1.1.0"))],
            },
        );
        message.community = "private".to_string();
        let result = run(&message, &mut state);
        assert!(result.response.is_none());
        assert_eq!(state.stats.auth_failures, 1);
    }

    #[test]
    fn test_get_missing_oid_v2c_markers() {
        let mut state = state();
        let message = request(
            SnmpVersion::V2c,
            Pdu::GetRequest {
                request_id: 2,
                bindings: vec![
                    // Unknown subtree entirely.
                    VarBind::null(oid("1.3.6.1.9.9.9.0")),
                    // Missing instance under an existing column.
                    VarBind::null(oid("1.3.6.1.2.1.2.2.1.1.99")),
                ],
            },
        );
        let result = run(&message, &mut state);
        let bindings = response_bindings(&result);
        assert_eq!(bindings[0].value, SnmpValue::NoSuchObject);
        assert_eq!(bindings[1].value, SnmpValue::NoSuchInstance);
    }

    #[test]
    fn test_get_missing_oid_v1_error_index() {
        let mut state = state();
        let message = request(
            SnmpVersion::V1,
            Pdu::GetRequest {
                request_id: 3,
                bindings: vec![
                    VarBind::null(oid("1.3.6.1.2.1.1.1.0")),
                    VarBind::null(oid("1.3.6.1.9.9.9.0")),
                ],
            },
        );
        let result = run(&message, &mut state);
        match &result.response.as_ref().unwrap().pdu {
            Pdu::Response {
                error_status,
                error_index,
                ..
            } => {
                assert_eq!(*error_status, ErrorStatus::NoSuchName);
                assert_eq!(*error_index, 2);
            }
            other => panic!("expected response, got {other:?}"),
        }
        assert_eq!(state.stats.error_responses, 1);
    }

    #[test]
    fn test_get_next_walks_in_order() {
        let mut state = state();
        let message = request(
            SnmpVersion::V2c,
            Pdu::GetNextRequest {
                request_id: 4,
                bindings: vec![VarBind::null(oid("1.3.6.1.2.1.1.1.0"))],
            },
        );
        let result = run(&message, &mut state);
        let bindings = response_bindings(&result);
        assert_eq!(bindings[0].oid, oid("1.3.6.1.2.1.1.3.0"));
        assert!(matches!(bindings[0].value, SnmpValue::TimeTicks(_)));
    }

    #[test]
    fn test_get_next_end_of_mib() {
        let mut v2c_state = state();
        let end = oid("1.3.6.1.9.9.9");
        let message = request(
            SnmpVersion::V2c,
            Pdu::GetNextRequest {
                request_id: 5,
                bindings: vec![VarBind::null(end.clone())],
            },
        );
        let result = run(&message, &mut v2c_state);
        let bindings = response_bindings(&result);
        assert_eq!(bindings[0].oid, end);
        assert_eq!(bindings[0].value, SnmpValue::EndOfMibView);

        let v1_message = request(
            SnmpVersion::V1,
            Pdu::GetNextRequest {
                request_id: 6,
                bindings: vec![VarBind::null(end)],
            },
        );
        let mut state = state();
        let result = run(&v1_message, &mut state);
        match &result.response.as_ref().unwrap().pdu {
            Pdu::Response { error_status, .. } => {
                assert_eq!(*error_status, ErrorStatus::NoSuchName)
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_bulk_scenario() {
        let mut state = state();
        let message = request(
            SnmpVersion::V2c,
            Pdu::GetBulkRequest {
                request_id: 8,
                non_repeaters: 1,
                max_repetitions: 3,
                bindings: vec![
                    VarBind::null(oid("1.3.6.1.2.1.1.1.0")),
                    VarBind::null(oid("1.3.6.1.2.1.2.2.1.1")),
                ],
            },
        );
        let result = run(&message, &mut state);
        let bindings = response_bindings(&result);
        assert_eq!(bindings.len(), 4);
        assert_eq!(bindings[0].oid, oid("1.3.6.1.2.1.1.3.0"));
        assert_eq!(bindings[1].value, SnmpValue::Integer(1));
        assert_eq!(bindings[2].value, SnmpValue::Integer(2));
        assert_eq!(bindings[3].value, SnmpValue::Integer(3));
    }

    #[test]
    fn test_bulk_rejected_on_v1() {
        let mut state = state();
        let message = request(
            SnmpVersion::V1,
            Pdu::GetBulkRequest {
                request_id: 9,
                non_repeaters: 0,
                max_repetitions: 5,
                bindings: vec![VarBind::null(oid("1.3.6.1"))],
            },
        );
        let result = run(&message, &mut state);
        match &result.response.as_ref().unwrap().pdu {
            Pdu::Response { error_status, .. } => assert_eq!(*error_status, ErrorStatus::GenErr),
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_set_not_writable_outside_upgrade_group() {
        let mut state = state();
        let message = request(
            SnmpVersion::V2c,
            Pdu::SetRequest {
                request_id: 10,
                bindings: vec![VarBind::new(
                    oid("1.3.6.1.2.1.1.5.0"),
                    SnmpValue::OctetString(b"new-name".to_vec()),
                )],
            },
        );
        let result = run(&message, &mut state);
        match &result.response.as_ref().unwrap().pdu {
            Pdu::Response {
                error_status,
                error_index,
                ..
            } => {
                assert_eq!(*error_status, ErrorStatus::NotWritable);
                assert_eq!(*error_index, 1);
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_set_upgrade_flow_reports_action() {
        let mut state = state();
        let server_set = request(
            SnmpVersion::V2c,
            Pdu::SetRequest {
                request_id: 11,
                bindings: vec![VarBind::new(
                    super::super::upgrade::SERVER_OID.clone(),
                    SnmpValue::IpAddress([10, 0, 0, 9]),
                )],
            },
        );
        assert!(run(&server_set, &mut state).actions.is_empty());

        let filename_set = request(
            SnmpVersion::V2c,
            Pdu::SetRequest {
                request_id: 12,
                bindings: vec![VarBind::new(
                    super::super::upgrade::FILENAME_OID.clone(),
                    SnmpValue::OctetString(b"fw.bin".to_vec()),
                )],
            },
        );
        assert!(run(&filename_set, &mut state).actions.is_empty());

        let trigger = request(
            SnmpVersion::V2c,
            Pdu::SetRequest {
                request_id: 13,
                bindings: vec![VarBind::new(
                    super::super::upgrade::ADMIN_OID.clone(),
                    SnmpValue::Integer(1),
                )],
            },
        );
        let result = run(&trigger, &mut state);
        assert_eq!(result.actions, vec![SetAction::StartUpgrade]);
    }

    #[test]
    fn test_set_wrong_length_folds_to_bad_value_on_v1() {
        let mut state = state();
        let message = request(
            SnmpVersion::V1,
            Pdu::SetRequest {
                request_id: 14,
                bindings: vec![VarBind::new(
                    super::super::upgrade::FILENAME_OID.clone(),
                    SnmpValue::OctetString(vec![b'x'; 65]),
                )],
            },
        );
        let result = run(&message, &mut state);
        match &result.response.as_ref().unwrap().pdu {
            Pdu::Response { error_status, .. } => {
                assert_eq!(*error_status, ErrorStatus::BadValue);
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_upgrade_cells_visible_to_get() {
        let mut state = state();
        state.upgrade.filename = Some("fw.bin".to_string());
        let message = request(
            SnmpVersion::V2c,
            Pdu::GetRequest {
                request_id: 15,
                bindings: vec![VarBind::null(super::super::upgrade::FILENAME_OID.clone())],
            },
        );
        let result = run(&message, &mut state);
        let bindings = response_bindings(&result);
        assert_eq!(bindings[0].value, SnmpValue::OctetString(b"fw.bin".to_vec()));
    }
}
