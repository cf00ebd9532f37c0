//! Firmware-upgrade control group
//!
//! The one writable surface the simulator exposes: the DOCSIS software
//! upgrade objects (`docsDevSw*`). Server and filename are plain writable
//! cells with validation; the admin-status object doubles as the trigger
//! and only fires when both preconditions hold. The oper-status object is
//! read-only and walks idle -> inProgress -> complete on device-local
//! timers driven by the actor.

use once_cell::sync::Lazy;

use crate::snmp::{ErrorStatus, Oid, SnmpValue};

pub static SERVER_OID: Lazy<Oid> = Lazy::new(|| "1.3.6.1.2.1.69.1.3.1.0".parse().expect("oid"));
pub static FILENAME_OID: Lazy<Oid> = Lazy::new(|| "1.3.6.1.2.1.69.1.3.2.0".parse().expect("oid"));
pub static ADMIN_OID: Lazy<Oid> = Lazy::new(|| "1.3.6.1.2.1.69.1.3.3.0".parse().expect("oid"));
pub static OPER_OID: Lazy<Oid> = Lazy::new(|| "1.3.6.1.2.1.69.1.3.4.0".parse().expect("oid"));
pub static CURRENT_VERSION_OID: Lazy<Oid> =
    Lazy::new(|| "1.3.6.1.2.1.69.1.3.5.0".parse().expect("oid"));

// docsDevSwAdminStatus
pub const ADMIN_UPGRADE_FROM_MGT: i64 = 1;
pub const ADMIN_ALLOW_PROVISIONING: i64 = 2;
pub const ADMIN_IGNORE_PROVISIONING: i64 = 3;

// docsDevSwOperStatus
pub const OPER_IN_PROGRESS: i64 = 1;
pub const OPER_COMPLETE_FROM_MGT: i64 = 3;
pub const OPER_FAILED: i64 = 4;
pub const OPER_IDLE: i64 = 5; // "other": no upgrade attempted since boot

#[derive(Debug, Clone)]
pub struct UpgradeState {
    pub server: Option<[u8; 4]>,
    pub filename: Option<String>,
    pub admin_status: i64,
    pub oper_status: i64,
    pub current_version: String,
}

impl Default for UpgradeState {
    fn default() -> Self {
        Self {
            server: None,
            filename: None,
            admin_status: ADMIN_ALLOW_PROVISIONING,
            oper_status: OPER_IDLE,
            current_version: "1.0.0".to_string(),
        }
    }
}

/// What a successful SET asks the actor to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetAction {
    None,
    /// Valid trigger: schedule the inProgress -> complete transitions.
    StartUpgrade,
}

impl UpgradeState {
    /// True when `oid` belongs to the upgrade group (writable or not).
    pub fn covers(oid: &Oid) -> bool {
        *oid == *SERVER_OID
            || *oid == *FILENAME_OID
            || *oid == *ADMIN_OID
            || *oid == *OPER_OID
            || *oid == *CURRENT_VERSION_OID
    }

    /// Current value overlay consulted before the profile on GET/GETNEXT.
    pub fn get(&self, oid: &Oid) -> Option<SnmpValue> {
        if *oid == *SERVER_OID {
            Some(SnmpValue::IpAddress(self.server.unwrap_or([0, 0, 0, 0])))
        } else if *oid == *FILENAME_OID {
            Some(SnmpValue::OctetString(
                self.filename.clone().unwrap_or_default().into_bytes(),
            ))
        } else if *oid == *ADMIN_OID {
            Some(SnmpValue::Integer(self.admin_status))
        } else if *oid == *OPER_OID {
            Some(SnmpValue::Integer(self.oper_status))
        } else if *oid == *CURRENT_VERSION_OID {
            Some(SnmpValue::OctetString(
                self.current_version.clone().into_bytes(),
            ))
        } else {
            None
        }
    }

    /// Apply one SET varbind. Returns the follow-up action, or the SNMP
    /// error to report.
    pub fn set(
        &mut self,
        oid: &Oid,
        value: &SnmpValue,
        max_filename_length: usize,
    ) -> Result<SetAction, ErrorStatus> {
        if *oid == *SERVER_OID {
            self.set_server(value).map(|_| SetAction::None)
        } else if *oid == *FILENAME_OID {
            self.set_filename(value, max_filename_length)
                .map(|_| SetAction::None)
        } else if *oid == *ADMIN_OID {
            self.set_admin(value)
        } else if *oid == *OPER_OID || *oid == *CURRENT_VERSION_OID {
            Err(ErrorStatus::NotWritable)
        } else {
            Err(ErrorStatus::NotWritable)
        }
    }

    fn set_server(&mut self, value: &SnmpValue) -> Result<(), ErrorStatus> {
        let octets = match value {
            SnmpValue::IpAddress(octets) => *octets,
            // Some managers write the address as a dotted-quad string.
            SnmpValue::OctetString(bytes) => {
                let text = std::str::from_utf8(bytes).map_err(|_| ErrorStatus::WrongValue)?;
                parse_dotted_quad(text).ok_or(ErrorStatus::WrongValue)?
            }
            _ => return Err(ErrorStatus::WrongType),
        };
        if octets == [0, 0, 0, 0] {
            return Err(ErrorStatus::WrongValue);
        }
        self.server = Some(octets);
        Ok(())
    }

    fn set_filename(&mut self, value: &SnmpValue, max_length: usize) -> Result<(), ErrorStatus> {
        let bytes = match value {
            SnmpValue::OctetString(bytes) => bytes,
            _ => return Err(ErrorStatus::WrongType),
        };
        if bytes.len() > max_length {
            return Err(ErrorStatus::WrongLength);
        }
        let text = String::from_utf8(bytes.clone()).map_err(|_| ErrorStatus::WrongValue)?;
        self.filename = Some(text);
        Ok(())
    }

    fn set_admin(&mut self, value: &SnmpValue) -> Result<SetAction, ErrorStatus> {
        let status = match value {
            SnmpValue::Integer(v) => *v,
            _ => return Err(ErrorStatus::WrongType),
        };
        match status {
            ADMIN_UPGRADE_FROM_MGT => {
                let server_ok = self.server.is_some();
                let filename_ok = self.filename.as_deref().map_or(false, |f| !f.is_empty());
                if !server_ok || !filename_ok {
                    return Err(ErrorStatus::WrongValue);
                }
                self.admin_status = status;
                Ok(SetAction::StartUpgrade)
            }
            ADMIN_ALLOW_PROVISIONING | ADMIN_IGNORE_PROVISIONING => {
                self.admin_status = status;
                Ok(SetAction::None)
            }
            _ => Err(ErrorStatus::WrongValue),
        }
    }

    pub fn upgrade_started(&mut self) {
        self.oper_status = OPER_IN_PROGRESS;
    }

    pub fn upgrade_completed(&mut self) {
        self.oper_status = OPER_COMPLETE_FROM_MGT;
        if let Some(filename) = &self.filename {
            self.current_version = filename.clone();
        }
        self.admin_status = ADMIN_ALLOW_PROVISIONING;
    }

    pub fn upgrade_failed(&mut self) {
        self.oper_status = OPER_FAILED;
        self.admin_status = ADMIN_ALLOW_PROVISIONING;
    }
}

fn parse_dotted_quad(text: &str) -> Option<[u8; 4]> {
    let mut octets = [0u8; 4];
    let mut parts = text.trim().split('.');
    for slot in octets.iter_mut() {
        *slot = parts.next()?.parse().ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(octets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_length_validation() {
        let mut state = UpgradeState::default();
        let long = SnmpValue::OctetString(vec![b'a'; 65]);
        assert_eq!(
            state.set(&FILENAME_OID, &long, 64),
            Err(ErrorStatus::WrongLength)
        );

        let ok = SnmpValue::OctetString(b"fw.bin".to_vec());
        assert_eq!(state.set(&FILENAME_OID, &ok, 64), Ok(SetAction::None));
        assert_eq!(state.filename.as_deref(), Some("fw.bin"));

        assert_eq!(
            state.set(&FILENAME_OID, &SnmpValue::Integer(3), 64),
            Err(ErrorStatus::WrongType)
        );
    }

    #[test]
    fn test_server_validation() {
        let mut state = UpgradeState::default();
        assert_eq!(
            state.set(&SERVER_OID, &SnmpValue::IpAddress([10, 1, 2, 3]), 64),
            Ok(SetAction::None)
        );
        assert_eq!(state.server, Some([10, 1, 2, 3]));

        assert_eq!(
            state.set(&SERVER_OID, &SnmpValue::IpAddress([0, 0, 0, 0]), 64),
            Err(ErrorStatus::WrongValue)
        );
        assert_eq!(
            state.set(
                &SERVER_OID,
                &SnmpValue::OctetString(b"192.168.100.1".to_vec()),
                64
            ),
            Ok(SetAction::None)
        );
        assert_eq!(
            state.set(&SERVER_OID, &SnmpValue::OctetString(b"999.1.2.3".to_vec()), 64),
            Err(ErrorStatus::WrongValue)
        );
        assert_eq!(
            state.set(&SERVER_OID, &SnmpValue::Counter32(1), 64),
            Err(ErrorStatus::WrongType)
        );
    }

    #[test]
    fn test_trigger_preconditions() {
        let mut state = UpgradeState::default();
        let trigger = SnmpValue::Integer(ADMIN_UPGRADE_FROM_MGT);

        // No server, no filename.
        assert_eq!(state.set(&ADMIN_OID, &trigger, 64), Err(ErrorStatus::WrongValue));

        state
            .set(&SERVER_OID, &SnmpValue::IpAddress([10, 0, 0, 1]), 64)
            .unwrap();
        assert_eq!(state.set(&ADMIN_OID, &trigger, 64), Err(ErrorStatus::WrongValue));

        state
            .set(&FILENAME_OID, &SnmpValue::OctetString(b"fw.bin".to_vec()), 64)
            .unwrap();
        assert_eq!(state.set(&ADMIN_OID, &trigger, 64), Ok(SetAction::StartUpgrade));
    }

    #[test]
    fn test_admin_value_validation() {
        let mut state = UpgradeState::default();
        assert_eq!(
            state.set(&ADMIN_OID, &SnmpValue::Integer(9), 64),
            Err(ErrorStatus::WrongValue)
        );
        assert_eq!(
            state.set(&ADMIN_OID, &SnmpValue::OctetString(b"1".to_vec()), 64),
            Err(ErrorStatus::WrongType)
        );
        assert_eq!(
            state.set(&ADMIN_OID, &SnmpValue::Integer(ADMIN_IGNORE_PROVISIONING), 64),
            Ok(SetAction::None)
        );
    }

    #[test]
    fn test_oper_status_read_only_and_transitions() {
        let mut state = UpgradeState::default();
        assert_eq!(
            state.set(&OPER_OID, &SnmpValue::Integer(1), 64),
            Err(ErrorStatus::NotWritable)
        );

        assert_eq!(state.get(&OPER_OID), Some(SnmpValue::Integer(OPER_IDLE)));
        state.upgrade_started();
        assert_eq!(state.get(&OPER_OID), Some(SnmpValue::Integer(OPER_IN_PROGRESS)));

        state.filename = Some("fw2.bin".to_string());
        state.upgrade_completed();
        assert_eq!(
            state.get(&OPER_OID),
            Some(SnmpValue::Integer(OPER_COMPLETE_FROM_MGT))
        );
        assert_eq!(
            state.get(&CURRENT_VERSION_OID),
            Some(SnmpValue::OctetString(b"fw2.bin".to_vec()))
        );
    }
}
