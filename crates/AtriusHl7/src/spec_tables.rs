//! Field data types and maximum lengths for the v2.5.1 segments this crate
//! knows about.
//!
//! Lengths are the conformance lengths of the v2.5.1 segment definitions. Segments
//! outside this table are still writable; they simply carry no length metadata.

/// Data type and maximum length of one segment field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub data_type: &'static str,
    pub max_length: usize,
}

type FieldRow = (u16, &'static str, usize);

const MSH: &[FieldRow] = &[
    (1, "ST", 1),
    (2, "ST", 4),
    (3, "HD", 227),
    (4, "HD", 227),
    (5, "HD", 227),
    (6, "HD", 227),
    (7, "TS", 26),
    (8, "ST", 40),
    (9, "MSG", 15),
    (10, "ST", 20),
    (11, "PT", 3),
    (12, "VID", 60),
    (13, "NM", 15),
    (14, "ST", 180),
    (15, "ID", 2),
    (16, "ID", 2),
    (17, "ID", 3),
    (18, "ID", 16),
    (19, "CE", 250),
    (20, "ID", 20),
    (21, "EI", 427),
];

const SFT: &[FieldRow] = &[
    (1, "XON", 567),
    (2, "ST", 15),
    (3, "ST", 20),
    (4, "ST", 20),
    (5, "TX", 1024),
    (6, "TS", 26),
];

const PID: &[FieldRow] = &[
    (1, "SI", 4),
    (2, "CX", 20),
    (3, "CX", 250),
    (4, "CX", 20),
    (5, "XPN", 250),
    (6, "XPN", 250),
    (7, "TS", 26),
    (8, "IS", 1),
    (9, "XPN", 250),
    (10, "CE", 250),
    (11, "XAD", 250),
    (12, "IS", 4),
    (13, "XTN", 250),
    (14, "XTN", 250),
    (15, "CE", 250),
    (16, "CE", 250),
    (17, "CE", 250),
    (18, "CX", 250),
    (19, "ST", 16),
    (20, "DLN", 25),
    (21, "CX", 250),
    (22, "CE", 250),
    (23, "ST", 250),
    (24, "ID", 1),
    (25, "NM", 2),
    (26, "CE", 250),
    (27, "CE", 250),
    (28, "CE", 250),
    (29, "TS", 26),
    (30, "ID", 1),
    (31, "ID", 1),
    (32, "IS", 20),
    (33, "TS", 26),
    (34, "HD", 241),
    (35, "CE", 250),
    (36, "CE", 250),
    (37, "ST", 80),
    (38, "CE", 250),
    (39, "CWE", 250),
];

const PD1: &[FieldRow] = &[
    (1, "IS", 2),
    (2, "IS", 2),
    (3, "XON", 250),
    (4, "XCN", 250),
    (5, "IS", 2),
    (6, "IS", 2),
    (7, "IS", 2),
    (8, "IS", 1),
    (9, "ID", 1),
    (10, "CX", 250),
    (11, "CE", 250),
    (12, "ID", 1),
    (13, "DT", 8),
];

const NK1: &[FieldRow] = &[
    (1, "SI", 4),
    (2, "XPN", 250),
    (3, "CE", 250),
    (4, "XAD", 250),
    (5, "XTN", 250),
    (6, "XTN", 250),
    (7, "CE", 250),
    (8, "DT", 8),
    (9, "DT", 8),
    (10, "ST", 60),
    (11, "JCC", 20),
    (12, "CX", 250),
    (13, "XON", 250),
    (14, "CE", 250),
    (15, "IS", 1),
    (16, "TS", 26),
    (17, "IS", 2),
    (18, "IS", 2),
    (19, "CE", 250),
    (20, "CE", 250),
    (21, "IS", 2),
    (22, "CE", 250),
    (23, "ID", 1),
    (24, "IS", 2),
    (25, "CE", 250),
    (26, "XPN", 250),
    (27, "CE", 250),
    (28, "CE", 250),
    (29, "CE", 250),
    (30, "XPN", 250),
    (31, "XTN", 250),
    (32, "XAD", 250),
    (33, "CX", 250),
    (34, "IS", 2),
    (35, "CE", 250),
    (36, "IS", 2),
    (37, "ST", 16),
    (38, "ST", 25),
    (39, "CE", 250),
];

const PV1: &[FieldRow] = &[
    (1, "SI", 4),
    (2, "IS", 1),
    (3, "PL", 80),
    (4, "IS", 2),
    (5, "CX", 250),
    (6, "PL", 80),
    (7, "XCN", 250),
    (8, "XCN", 250),
    (9, "XCN", 250),
    (10, "IS", 3),
    (11, "PL", 80),
    (12, "IS", 2),
    (13, "IS", 2),
    (14, "IS", 6),
    (15, "IS", 2),
    (16, "IS", 2),
    (17, "XCN", 250),
    (18, "IS", 2),
    (19, "CX", 250),
    (20, "FC", 50),
    (21, "IS", 2),
    (36, "IS", 3),
    (37, "DLD", 47),
    (39, "IS", 2),
    (40, "IS", 1),
    (41, "IS", 2),
    (42, "PL", 80),
    (43, "PL", 80),
    (44, "TS", 26),
    (45, "TS", 26),
    (50, "CX", 250),
    (51, "IS", 1),
    (52, "XCN", 250),
];

const ORC: &[FieldRow] = &[
    (1, "ID", 2),
    (2, "EI", 22),
    (3, "EI", 22),
    (4, "EI", 22),
    (5, "ID", 2),
    (6, "ID", 1),
    (7, "TQ", 200),
    (8, "EIP", 200),
    (9, "TS", 26),
    (10, "XCN", 250),
    (11, "XCN", 250),
    (12, "XCN", 250),
    (13, "PL", 80),
    (14, "XTN", 250),
    (15, "TS", 26),
    (16, "CE", 250),
    (17, "CE", 250),
    (18, "CE", 250),
    (19, "XCN", 250),
    (20, "CE", 250),
    (21, "XON", 250),
    (22, "XAD", 250),
    (23, "XTN", 250),
    (24, "XAD", 250),
    (25, "CWE", 250),
    (26, "CWE", 60),
    (27, "TS", 26),
    (28, "CWE", 250),
    (29, "CWE", 250),
    (30, "CNE", 250),
    (31, "CWE", 250),
];

const OBR: &[FieldRow] = &[
    (1, "SI", 4),
    (2, "EI", 22),
    (3, "EI", 22),
    (4, "CE", 250),
    (5, "ID", 2),
    (6, "TS", 26),
    (7, "TS", 26),
    (8, "TS", 26),
    (9, "CQ", 20),
    (10, "XCN", 250),
    (11, "ID", 1),
    (12, "CE", 250),
    (13, "ST", 300),
    (14, "TS", 26),
    (15, "SPS", 300),
    (16, "XCN", 250),
    (17, "XTN", 250),
    (18, "ST", 60),
    (19, "ST", 60),
    (20, "ST", 60),
    (21, "ST", 60),
    (22, "TS", 26),
    (23, "MOC", 40),
    (24, "ID", 10),
    (25, "ID", 1),
    (26, "PRL", 400),
    (27, "TQ", 200),
    (28, "XCN", 250),
    (29, "EIP", 200),
    (30, "ID", 20),
    (31, "CE", 250),
    (32, "NDL", 200),
    (33, "NDL", 200),
    (34, "NDL", 200),
    (35, "NDL", 200),
    (36, "TS", 26),
    (37, "NM", 4),
    (38, "CE", 250),
    (39, "CE", 250),
    (40, "CE", 250),
    (41, "ID", 30),
    (42, "ID", 1),
    (43, "CE", 250),
    (44, "CE", 250),
    (45, "CE", 250),
    (46, "CE", 250),
    (47, "CE", 250),
    (48, "CWE", 250),
    (49, "IS", 2),
    (50, "CWE", 250),
];

const OBX: &[FieldRow] = &[
    (1, "SI", 4),
    (2, "ID", 2),
    (3, "CE", 250),
    (4, "ST", 20),
    (5, "VARIES", 99999),
    (6, "CE", 250),
    (7, "ST", 60),
    (8, "IS", 5),
    (9, "NM", 5),
    (10, "ID", 2),
    (11, "ID", 1),
    (12, "TS", 26),
    (13, "ST", 20),
    (14, "TS", 26),
    (15, "CE", 250),
    (16, "XCN", 250),
    (17, "CE", 250),
    (18, "EI", 22),
    (19, "TS", 26),
    (20, "CWE", 250),
    (21, "EI", 427),
    (22, "CWE", 250),
    (23, "XON", 567),
    (24, "XAD", 631),
    (25, "XCN", 3002),
];

const NTE: &[FieldRow] = &[
    (1, "SI", 4),
    (2, "ID", 8),
    (3, "FT", 65536),
    (4, "CE", 250),
];

const SPM: &[FieldRow] = &[
    (1, "SI", 4),
    (2, "EIP", 80),
    (3, "EIP", 80),
    (4, "CWE", 250),
    (5, "CWE", 250),
    (6, "CWE", 250),
    (7, "CWE", 250),
    (8, "CWE", 250),
    (9, "CWE", 250),
    (10, "CWE", 250),
    (11, "CWE", 250),
    (12, "CQ", 20),
    (13, "NM", 6),
    (14, "ST", 250),
    (15, "CWE", 250),
    (16, "CWE", 250),
    (17, "DR", 26),
    (18, "TS", 26),
    (19, "TS", 26),
    (20, "ID", 1),
    (21, "CWE", 250),
    (22, "CWE", 250),
    (23, "CWE", 250),
    (24, "CWE", 250),
    (25, "CQ", 20),
    (26, "NM", 4),
    (27, "CWE", 250),
    (28, "CWE", 250),
    (29, "CWE", 250),
];

const TQ1: &[FieldRow] = &[
    (1, "SI", 4),
    (2, "CQ", 20),
    (3, "RPT", 540),
    (4, "TM", 20),
    (5, "CQ", 20),
    (6, "CQ", 20),
    (7, "TS", 26),
    (8, "TS", 26),
    (9, "CWE", 250),
    (10, "TX", 250),
    (11, "TX", 250),
    (12, "ID", 10),
    (13, "CQ", 20),
    (14, "NM", 4),
];

fn segment_rows(segment: &str) -> Option<&'static [FieldRow]> {
    match segment {
        "MSH" => Some(MSH),
        "SFT" => Some(SFT),
        "PID" => Some(PID),
        "PD1" => Some(PD1),
        "NK1" => Some(NK1),
        "PV1" => Some(PV1),
        "ORC" => Some(ORC),
        "OBR" => Some(OBR),
        "OBX" => Some(OBX),
        "NTE" => Some(NTE),
        "SPM" => Some(SPM),
        "TQ1" => Some(TQ1),
        _ => None,
    }
}

/// Looks up the definition of `segment`-`field`.
pub fn field_spec(segment: &str, field: usize) -> Option<FieldSpec> {
    segment_rows(segment)?
        .iter()
        .find(|(number, _, _)| usize::from(*number) == field)
        .map(|(_, data_type, max_length)| FieldSpec {
            data_type,
            max_length: *max_length,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_fields_resolve() {
        assert_eq!(
            field_spec("MSH", 4),
            Some(FieldSpec { data_type: "HD", max_length: 227 })
        );
        assert_eq!(field_spec("PID", 5).map(|s| s.data_type), Some("XPN"));
        assert_eq!(field_spec("OBX", 18).map(|s| s.max_length), Some(22));
    }

    #[test]
    fn unknown_segments_and_fields_resolve_to_none() {
        assert_eq!(field_spec("ZPI", 1), None);
        assert_eq!(field_spec("PID", 99), None);
    }
}
