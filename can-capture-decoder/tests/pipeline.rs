//! End-to-end tests: DBC on disk, capture files on disk, decoded CSVs back.

use can_capture_decoder::{
    parse_csv, to_csv_bytes, BatchConverter, Decoder, DecoderConfig, FileConverter, OutputLayout,
    RowTimestamp, SignalRow, SignalValue,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const VEHICLE_DBC: &str = r#"
VERSION ""

NS_ :

BS_:

BU_: TCU BMS

BO_ 2452903544 Sensor: 8 TCU
 SG_ Temp : 0|8@1+ (1,0) [0|255] "C" TCU

BO_ 291 EngineData: 8 TCU
 SG_ EngineSpeed : 0|16@1+ (1,0) [0|8000] "rpm" TCU
 SG_ EngineTemp : 16|8@1+ (1,-40) [-40|215] "C" TCU
 SG_ ThrottlePos : 24|8@1+ (0.5,0) [0|100] "%" TCU

BO_ 1024 PackStatus: 4 BMS
 SG_ PackCurrent : 7|16@0- (0.1,0) [-3276.8|3276.7] "A" BMS
 SG_ PackVoltage : 23|16@0+ (0.01,0) [0|655.35] "V" BMS
"#;

struct Fixture {
    dir: TempDir,
    decoder: Decoder,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let dbc = dir.path().join("vehicle.dbc");
        fs::write(&dbc, VEHICLE_DBC).unwrap();
        let decoder = Decoder::from_dbc_files(&[&dbc]).unwrap();
        Self { dir, decoder }
    }

    fn raw(&self) -> PathBuf {
        self.dir.path().join("raw")
    }

    fn out(&self) -> PathBuf {
        self.dir.path().join("parsed_files")
    }

    fn write_capture(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.raw().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn convert(&self, input: &Path) -> can_capture_decoder::FileReport {
        let layout = OutputLayout::new(self.raw(), &DecoderConfig::new().with_output_dir(self.out()));
        FileConverter::new(&self.decoder)
            .convert_file(input, &layout)
            .unwrap()
    }
}

#[test]
fn test_single_known_frame() {
    let fx = Fixture::new();
    let input = fx.write_capture("CAN_0001.TXT", "0000000Ax12345678FF00FF00FF00FF00\n");

    let report = fx.convert(&input);

    assert_eq!(fs::read_to_string(&report.rows_path).unwrap(), "0.01,Temp,255\n");
    assert!(report.skipped_path.is_none());
    assert!(!fx.out().join("CAN_0001.skipped.txt").exists());
}

#[test]
fn test_one_row_per_signal() {
    let fx = Fixture::new();
    let input = fx.write_capture(
        "engine.txt",
        "000003E8x00000123E803780300000000\n00000400x00000400FF380FA0\n",
    );

    let report = fx.convert(&input);

    assert_eq!(
        fs::read_to_string(&report.rows_path).unwrap(),
        "1.0,EngineSpeed,1000\n\
         1.0,EngineTemp,80\n\
         1.0,ThrottlePos,1.5\n\
         1.024,PackCurrent,-20.0\n\
         1.024,PackVoltage,40.0\n"
    );
    assert_eq!(report.stats.lines, 2);
    assert_eq!(report.stats.rows, 5);
}

#[test]
fn test_rejected_lines_are_copied_verbatim() {
    let fx = Fixture::new();
    let input = fx.write_capture(
        "mixed.txt",
        "00000000xZZZZZZZZFF\n\
         0000000Ax12345678FF00FF00FF00FF00\n\
         00000014x000007FF0102\n\
         short\n\
         0000001Ex0000040001\n",
    );

    let report = fx.convert(&input);

    assert_eq!(fs::read_to_string(&report.rows_path).unwrap(), "0.01,Temp,255\n");
    let skipped = report.skipped_path.unwrap();
    assert_eq!(
        fs::read_to_string(skipped).unwrap(),
        "00000000xZZZZZZZZFF\n00000014x000007FF0102\nshort\n0000001Ex0000040001\n"
    );
    assert_eq!(report.stats.malformed, 2);
    assert_eq!(report.stats.unknown_id, 1);
    assert_eq!(report.stats.decode_failed, 1);
    assert_eq!(report.stats.lines, report.stats.decoded_lines + report.stats.rejected());
}

#[test]
fn test_conversion_is_idempotent() {
    let fx = Fixture::new();
    let input = fx.write_capture(
        "day1/CAN_0007.TXT",
        "0000000Ax12345678FF00FF00FF00FF00\n\
         bogus\n\
         000003E8x00000123E803780300000000\n",
    );

    let first = fx.convert(&input);
    let rows_first = fs::read(&first.rows_path).unwrap();
    let skipped_first = fs::read(first.skipped_path.as_ref().unwrap()).unwrap();

    let second = fx.convert(&input);
    assert_eq!(fs::read(&second.rows_path).unwrap(), rows_first);
    assert_eq!(fs::read(second.skipped_path.as_ref().unwrap()).unwrap(), skipped_first);
    assert_eq!(first, second);
}

#[test]
fn test_decoded_rows_survive_round_trip() {
    let fx = Fixture::new();
    let input = fx.write_capture(
        "round.txt",
        "0000000Ax12345678FF00FF00FF00FF00\n\
         000003E8x00000123E803780300000000\n\
         00000400x00000400FF380FA0\n",
    );
    let report = fx.convert(&input);

    let parsed = parse_csv(&report.rows_path).unwrap().unwrap();
    let names: Vec<(&str, SignalValue)> = parsed.iter().map(|r| (r.signal.as_str(), r.value)).collect();
    assert_eq!(
        names,
        vec![
            ("Temp", SignalValue::Integer(255)),
            ("EngineSpeed", SignalValue::Integer(1000)),
            ("EngineTemp", SignalValue::Integer(80)),
            ("ThrottlePos", SignalValue::Float(1.5)),
            ("PackCurrent", SignalValue::Float(-20.0)),
            ("PackVoltage", SignalValue::Float(40.0)),
        ]
    );
    assert!(parsed.iter().all(|r| matches!(r.timestamp, RowTimestamp::Absolute(_))));

    // Serialized rows parse back to the same names and values
    let relative = vec![SignalRow::relative(0.01, "Temp", SignalValue::Integer(255))];
    let served = fx.dir.path().join("served.csv");
    fs::write(&served, to_csv_bytes(&relative).unwrap()).unwrap();
    let reparsed = parse_csv(&served).unwrap().unwrap();
    assert_eq!(reparsed.len(), 1);
    assert_eq!(reparsed[0].signal, "Temp");
    assert_eq!(reparsed[0].value, SignalValue::Integer(255));

    let again = fx.dir.path().join("again.csv");
    fs::write(&again, to_csv_bytes(&parsed).unwrap()).unwrap();
    assert_eq!(parse_csv(&again).unwrap(), Some(parsed));
}

#[test]
fn test_empty_rows_serialize_to_nothing() {
    assert!(to_csv_bytes(&[]).unwrap().is_empty());
}

#[test]
fn test_folder_mirrors_input_tree() {
    let fx = Fixture::new();
    fx.write_capture("2024-05-01/CAN_0001.TXT", "0000000Ax12345678FF00FF00FF00FF00\n");
    fx.write_capture("2024-05-01/CAN_0002.txt", "00000014x123456780100000000000000\n");
    fx.write_capture("2024-05-02/CAN_0001.TXT", "0000001Ex123456780200000000000000\n");
    fx.write_capture("2024-05-02/README.md", "not a capture\n");

    let config = DecoderConfig::new().with_output_dir(fx.out()).with_jobs(2);
    let report = BatchConverter::new(&fx.decoder, config)
        .convert_folder(&fx.raw())
        .unwrap();

    assert!(report.failed.is_empty());
    assert_eq!(
        report.output_paths(),
        vec![
            fx.out().join("2024-05-01/CAN_0001.csv"),
            fx.out().join("2024-05-01/CAN_0002.csv"),
            fx.out().join("2024-05-02/CAN_0001.csv"),
        ]
    );
    assert_eq!(
        fs::read_to_string(fx.out().join("2024-05-02/CAN_0001.csv")).unwrap(),
        "0.03,Temp,2\n"
    );
}

#[cfg(unix)]
#[test]
fn test_folder_continues_past_failing_file() {
    let fx = Fixture::new();
    fx.write_capture("a/CAN_0001.TXT", "0000000Ax12345678FF00FF00FF00FF00\n");
    fx.write_capture("b/CAN_0002.TXT", "00000014x123456780100000000000000\n");
    fx.write_capture("c/CAN_0003.TXT", "garbage\n");
    let dangling = fx.raw().join("c/CAN_0004.TXT");
    std::os::unix::fs::symlink(fx.dir.path().join("missing.TXT"), &dangling).unwrap();

    let report = BatchConverter::new(&fx.decoder, DecoderConfig::new().with_output_dir(fx.out()))
        .convert_folder(&fx.raw())
        .unwrap();

    assert_eq!(report.succeeded.len(), 3);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].path, dangling);
    assert!(fx.out().join("c/CAN_0003.skipped.txt").exists());
    assert!(!fx.out().join("c/CAN_0004.csv").exists());
}
