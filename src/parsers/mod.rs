//! Report parsing and conversion: vendor-native XML in, SARIF out.

pub mod sarif;
pub mod sast_xml;
