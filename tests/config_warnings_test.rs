use std::sync::Mutex;

use camera_pose_refinement::config::ExtractorConfig;
use camera_pose_refinement::extractor::validate_config;
use log::{Level, LevelFilter, Log, Metadata, Record};

struct CapturingLogger {
    warnings: Mutex<Vec<String>>,
}

impl Log for CapturingLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Warn
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.warnings
                .lock()
                .unwrap()
                .push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

static LOGGER: CapturingLogger = CapturingLogger {
    warnings: Mutex::new(Vec::new()),
};

fn warnings_of(config: &ExtractorConfig) -> Vec<String> {
    LOGGER.warnings.lock().unwrap().clear();
    validate_config(config).unwrap();
    LOGGER.warnings.lock().unwrap().clone()
}

#[test]
fn test_advisory_warnings() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Warn);

    let config = |min_features, max_features| ExtractorConfig {
        min_features,
        max_features,
        ignore_dynamic_objects: false,
    };

    assert!(warnings_of(&config(20, Some(40))).is_empty());
    assert!(warnings_of(&config(40, None)).is_empty());

    let warnings = warnings_of(&config(10, None));
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("`min_features` was set to 10"));
    assert!(warnings[0].contains("at least 20"));

    let warnings = warnings_of(&config(20, Some(39)));
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("`max_features` was set to 39"));
    assert!(warnings[0].contains("(40)"));

    let warnings = warnings_of(&config(8, Some(10)));
    assert_eq!(warnings.len(), 2);
}
