//! Minimal FIT (Flexible and Interoperable Data Transfer) encoder for
//! weight-scale files, the format Garmin Connect accepts for body
//! composition uploads.
//!
//! A file is a 12-byte header, a sequence of definition and data records,
//! and a trailing CRC-16. All multi-byte values are little-endian.

use chrono::{DateTime, Utc};
use crc::{Crc, CRC_16_ARC};

/// Seconds between the Unix epoch and the FIT epoch (1989-12-31T00:00:00Z).
const FIT_EPOCH_OFFSET: i64 = 631_065_600;

const HEADER_SIZE: u8 = 12;
const PROTOCOL_VERSION: u8 = 16;
const PROFILE_VERSION: u16 = 108;

/// `file_id.type` value for weight files.
const FILE_TYPE_WEIGHT: u8 = 9;

// Global message numbers
const MESG_FILE_ID: u16 = 0;
const MESG_DEVICE_INFO: u16 = 23;
const MESG_WEIGHT_SCALE: u16 = 30;
const MESG_FILE_CREATOR: u16 = 49;

// Local message types
const LOCAL_FILE_ID: u8 = 0;
const LOCAL_FILE_CREATOR: u8 = 1;
const LOCAL_DEVICE_INFO: u8 = 2;
const LOCAL_WEIGHT_SCALE: u8 = 3;

const DEFINITION_FLAG: u8 = 0x40;

/// FIT files use CRC-16/ARC (polynomial 0x8005 reflected, initial value 0).
const FIT_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

#[derive(Debug, Clone, Copy)]
enum BaseType {
    Enum,
    UInt8,
    UInt16,
    UInt32,
    UInt32z,
}

impl BaseType {
    fn size(self) -> u8 {
        match self {
            BaseType::Enum | BaseType::UInt8 => 1,
            BaseType::UInt16 => 2,
            BaseType::UInt32 | BaseType::UInt32z => 4,
        }
    }

    fn id(self) -> u8 {
        match self {
            BaseType::Enum => 0x00,
            BaseType::UInt8 => 0x02,
            BaseType::UInt16 => 0x84,
            BaseType::UInt32 => 0x86,
            BaseType::UInt32z => 0x8C,
        }
    }

    /// Marker for "no value".
    fn invalid(self) -> u32 {
        match self {
            BaseType::Enum | BaseType::UInt8 => 0xFF,
            BaseType::UInt16 => 0xFFFF,
            BaseType::UInt32 => 0xFFFF_FFFF,
            BaseType::UInt32z => 0,
        }
    }

    /// Largest storable value. For the zero-invalid type every non-zero
    /// value fits; for the others the invalid marker is excluded.
    fn max_valid(self) -> u32 {
        match self {
            BaseType::UInt32z => u32::MAX,
            other => other.invalid() - 1,
        }
    }

    fn write(self, buf: &mut Vec<u8>, value: u32) {
        match self.size() {
            1 => buf.push(value as u8),
            2 => buf.extend_from_slice(&(value as u16).to_le_bytes()),
            _ => buf.extend_from_slice(&value.to_le_bytes()),
        }
    }
}

struct Field {
    number: u8,
    base: BaseType,
    value: Option<u32>,
}

impl Field {
    fn raw(number: u8, base: BaseType, value: Option<u32>) -> Self {
        Self {
            number,
            base,
            value: value.map(|v| v.min(base.max_valid())),
        }
    }

    /// A physical value stored as `round(value * scale)`.
    fn scaled(number: u8, base: BaseType, value: Option<f64>, scale: f64) -> Self {
        let raw = value
            .filter(|v| v.is_finite())
            .map(|v| (v * scale).round().clamp(0.0, base.max_valid() as f64) as u32);
        Self::raw(number, base, raw)
    }
}

/// One body composition measurement. Units follow the FIT profile: kg for
/// masses, percent for ratios.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightScale {
    pub weight: f64,
    pub percent_fat: Option<f64>,
    pub percent_hydration: Option<f64>,
    pub visceral_fat_mass: Option<f64>,
    pub bone_mass: Option<f64>,
    pub muscle_mass: Option<f64>,
    pub basal_met: Option<f64>,
    pub active_met: Option<f64>,
    pub physique_rating: Option<f64>,
    pub metabolic_age: Option<f64>,
    pub visceral_fat_rating: Option<f64>,
    pub bmi: Option<f64>,
}

pub struct FitEncoder {
    buf: Vec<u8>,
    weight_scale_defined: bool,
}

impl Default for FitEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FitEncoder {
    pub fn new() -> Self {
        Self {
            // Header is filled in by finish()
            buf: vec![0; HEADER_SIZE as usize],
            weight_scale_defined: false,
        }
    }

    /// Build a complete weight file holding one measurement.
    pub fn weight_file(measured_at: DateTime<Utc>, measurement: &WeightScale) -> Vec<u8> {
        let mut encoder = Self::new();
        encoder.write_file_id(measured_at);
        encoder.write_file_creator();
        encoder.write_device_info(measured_at);
        encoder.write_weight_scale(measured_at, measurement);
        encoder.finish()
    }

    pub fn write_file_id(&mut self, time_created: DateTime<Utc>) {
        let fields = [
            Field::raw(3, BaseType::UInt32z, None),
            Field::raw(4, BaseType::UInt32, Some(fit_timestamp(time_created))),
            Field::raw(1, BaseType::UInt16, None),
            Field::raw(2, BaseType::UInt16, None),
            Field::raw(5, BaseType::UInt16, None),
            Field::raw(0, BaseType::Enum, Some(FILE_TYPE_WEIGHT as u32)),
        ];
        self.write_definition(LOCAL_FILE_ID, MESG_FILE_ID, &fields);
        self.write_data(LOCAL_FILE_ID, &fields);
    }

    pub fn write_file_creator(&mut self) {
        let fields = [
            Field::raw(0, BaseType::UInt16, None),
            Field::raw(1, BaseType::UInt8, None),
        ];
        self.write_definition(LOCAL_FILE_CREATOR, MESG_FILE_CREATOR, &fields);
        self.write_data(LOCAL_FILE_CREATOR, &fields);
    }

    pub fn write_device_info(&mut self, timestamp: DateTime<Utc>) {
        let fields = [
            Field::raw(253, BaseType::UInt32, Some(fit_timestamp(timestamp))),
            Field::raw(3, BaseType::UInt32z, None),
            Field::raw(7, BaseType::UInt32, None),
            Field::raw(8, BaseType::UInt32, None),
            Field::raw(2, BaseType::UInt16, None),
            Field::raw(4, BaseType::UInt16, None),
            Field::raw(5, BaseType::UInt16, None),
            Field::raw(10, BaseType::UInt16, None),
            Field::raw(0, BaseType::UInt8, None),
            Field::raw(1, BaseType::UInt8, None),
            Field::raw(6, BaseType::UInt8, None),
            Field::raw(11, BaseType::UInt8, None),
        ];
        self.write_definition(LOCAL_DEVICE_INFO, MESG_DEVICE_INFO, &fields);
        self.write_data(LOCAL_DEVICE_INFO, &fields);
    }

    pub fn write_weight_scale(&mut self, timestamp: DateTime<Utc>, m: &WeightScale) {
        let fields = [
            Field::raw(253, BaseType::UInt32, Some(fit_timestamp(timestamp))),
            Field::scaled(0, BaseType::UInt16, Some(m.weight), 100.0),
            Field::scaled(1, BaseType::UInt16, m.percent_fat, 100.0),
            Field::scaled(2, BaseType::UInt16, m.percent_hydration, 100.0),
            Field::scaled(3, BaseType::UInt16, m.visceral_fat_mass, 100.0),
            Field::scaled(4, BaseType::UInt16, m.bone_mass, 100.0),
            Field::scaled(5, BaseType::UInt16, m.muscle_mass, 100.0),
            Field::scaled(7, BaseType::UInt16, m.basal_met, 4.0),
            Field::scaled(9, BaseType::UInt16, m.active_met, 4.0),
            Field::scaled(8, BaseType::UInt8, m.physique_rating, 1.0),
            Field::scaled(10, BaseType::UInt8, m.metabolic_age, 1.0),
            Field::scaled(11, BaseType::UInt8, m.visceral_fat_rating, 1.0),
            Field::scaled(13, BaseType::UInt16, m.bmi, 10.0),
        ];
        if !self.weight_scale_defined {
            self.write_definition(LOCAL_WEIGHT_SCALE, MESG_WEIGHT_SCALE, &fields);
            self.weight_scale_defined = true;
        }
        self.write_data(LOCAL_WEIGHT_SCALE, &fields);
    }

    /// Write the header and the trailing CRC.
    pub fn finish(mut self) -> Vec<u8> {
        let data_size = (self.buf.len() - HEADER_SIZE as usize) as u32;

        let mut header = Vec::with_capacity(HEADER_SIZE as usize);
        header.push(HEADER_SIZE);
        header.push(PROTOCOL_VERSION);
        header.extend_from_slice(&PROFILE_VERSION.to_le_bytes());
        header.extend_from_slice(&data_size.to_le_bytes());
        header.extend_from_slice(b".FIT");
        self.buf[..HEADER_SIZE as usize].copy_from_slice(&header);

        let crc = crc16(&self.buf);
        self.buf.extend_from_slice(&crc.to_le_bytes());
        self.buf
    }

    fn write_definition(&mut self, local: u8, global: u16, fields: &[Field]) {
        self.buf.push(DEFINITION_FLAG | local);
        self.buf.push(0); // reserved
        self.buf.push(0); // little-endian architecture
        self.buf.extend_from_slice(&global.to_le_bytes());
        self.buf.push(fields.len() as u8);
        for field in fields {
            self.buf.push(field.number);
            self.buf.push(field.base.size());
            self.buf.push(field.base.id());
        }
    }

    fn write_data(&mut self, local: u8, fields: &[Field]) {
        self.buf.push(local);
        for field in fields {
            let value = field.value.unwrap_or_else(|| field.base.invalid());
            field.base.write(&mut self.buf, value);
        }
    }
}

/// Seconds since the FIT epoch.
fn fit_timestamp(t: DateTime<Utc>) -> u32 {
    (t.timestamp() - FIT_EPOCH_OFFSET).clamp(0, u32::MAX as i64) as u32
}

/// FIT CRC-16 over `data`.
pub fn crc16(data: &[u8]) -> u16 {
    FIT_CRC.checksum(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Size of the weight_scale data record: header byte + field bytes.
    const WEIGHT_RECORD_SIZE: usize = 1 + 4 + 2 * 8 + 3 + 2;

    fn measured_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 7, 30, 0).unwrap()
    }

    fn measurement() -> WeightScale {
        WeightScale {
            weight: 70.5,
            percent_fat: Some(18.2),
            percent_hydration: Some(55.0),
            bone_mass: Some(3.1),
            muscle_mass: Some(32.0),
            physique_rating: Some(5.0),
            metabolic_age: Some(30.0),
            visceral_fat_rating: Some(7.0),
            bmi: Some(22.1),
            ..Default::default()
        }
    }

    fn u16_at(buf: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([buf[offset], buf[offset + 1]])
    }

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16(b"123456789"), 0xBB3D);
        assert_eq!(crc16(&[]), 0);
    }

    #[test]
    fn test_header() {
        let file = FitEncoder::weight_file(measured_at(), &measurement());
        assert_eq!(file[0], 12);
        assert_eq!(file[1], 16);
        assert_eq!(u16_at(&file, 2), 108);
        let data_size = u32::from_le_bytes([file[4], file[5], file[6], file[7]]) as usize;
        assert_eq!(data_size, file.len() - 14);
        assert_eq!(&file[8..12], b".FIT");
    }

    #[test]
    fn test_crc_residue_is_zero() {
        let file = FitEncoder::weight_file(measured_at(), &measurement());
        assert_eq!(crc16(&file), 0);
    }

    #[test]
    fn test_first_record_is_file_id_definition() {
        let file = FitEncoder::weight_file(measured_at(), &measurement());
        assert_eq!(file[12], DEFINITION_FLAG | LOCAL_FILE_ID);
        assert_eq!(u16_at(&file, 15), MESG_FILE_ID);
        assert_eq!(file[17], 6);
    }

    #[test]
    fn test_weight_scale_values() {
        let file = FitEncoder::weight_file(measured_at(), &measurement());
        let start = file.len() - 2 - WEIGHT_RECORD_SIZE;
        let record = &file[start..file.len() - 2];

        assert_eq!(record[0], LOCAL_WEIGHT_SCALE);
        let ts = u32::from_le_bytes([record[1], record[2], record[3], record[4]]);
        assert_eq!(ts as i64, measured_at().timestamp() - FIT_EPOCH_OFFSET);

        assert_eq!(u16_at(record, 5), 7050); // weight
        assert_eq!(u16_at(record, 7), 1820); // percent_fat, rounded
        assert_eq!(u16_at(record, 9), 5500); // percent_hydration
        assert_eq!(u16_at(record, 11), 0xFFFF); // visceral_fat_mass unset
        assert_eq!(u16_at(record, 13), 310); // bone_mass
        assert_eq!(u16_at(record, 15), 3200); // muscle_mass
        assert_eq!(u16_at(record, 17), 0xFFFF); // basal_met unset
        assert_eq!(u16_at(record, 19), 0xFFFF); // active_met unset
        assert_eq!(record[21], 5); // physique_rating
        assert_eq!(record[22], 30); // metabolic_age
        assert_eq!(record[23], 7); // visceral_fat_rating
        assert_eq!(u16_at(record, 24), 221); // bmi
    }

    #[test]
    fn test_out_of_range_values_clamped() {
        let field = Field::scaled(0, BaseType::UInt16, Some(1_000.0), 100.0);
        assert_eq!(field.value, Some(0xFFFE));

        let field = Field::scaled(8, BaseType::UInt8, Some(-3.0), 1.0);
        assert_eq!(field.value, Some(0));

        let field = Field::scaled(8, BaseType::UInt8, Some(f64::NAN), 1.0);
        assert_eq!(field.value, None);
    }

    #[test]
    fn test_weight_scale_defined_once() {
        let mut encoder = FitEncoder::new();
        encoder.write_weight_scale(measured_at(), &measurement());
        let after_first = encoder.buf.len();
        encoder.write_weight_scale(measured_at(), &measurement());
        assert_eq!(encoder.buf.len() - after_first, WEIGHT_RECORD_SIZE);
    }
}
