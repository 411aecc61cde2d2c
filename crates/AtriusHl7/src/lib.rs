//! # Atrius HL7
//!
//! A small HL7 v2 message model: field locators, a segment store addressed through
//! [`FieldAccessor`], pipe-delimited encoding and v2.5.1 field metadata used for
//! length checks.
//!
//! ```
//! use atrius_hl7::{FieldAccessor, Hl7Message};
//!
//! let mut message = Hl7Message::new("ORU_R01", "2.5.1");
//! message.set("MSH-10", "MSG0001").unwrap();
//! message.set("/PATIENT_RESULT/PATIENT/PID-5-1", "Doe").unwrap();
//! assert!(message.encode().contains("PID|||||Doe"));
//! ```

pub mod error;
pub mod locator;
pub mod message;
pub mod spec_tables;

pub use error::Hl7Error;
pub use locator::{FieldLocator, PathStep};
pub use message::{FieldAccessor, Hl7Message, escape};
pub use spec_tables::{FieldSpec, field_spec};
