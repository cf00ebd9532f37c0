//! SNMP wire model: OIDs, values, PDUs and the BER codec

pub mod ber;
pub mod codec;
pub mod oid;
pub mod pdu;
pub mod value;

pub use codec::{decode_message, encode_message};
pub use oid::Oid;
pub use pdu::{ErrorStatus, Pdu, SnmpMessage, SnmpVersion, VarBind};
pub use value::{SnmpValue, ValueType};
