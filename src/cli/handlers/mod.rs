pub mod analyze;
pub mod config;
pub mod dynamic;
pub mod prepare;
pub mod status;

pub use analyze::handle_analyze_command;
pub use config::handle_config_command;
pub use dynamic::handle_dynamic_command;
pub use prepare::handle_prepare_command;
pub use status::{handle_report_command, handle_status_command};

use crate::cli::commands::EngineSelection;
use crate::scan::StaticScanManager;

/// Apply the command-line engine switches to a manager
pub(crate) fn configure_manager(manager: &mut StaticScanManager, engines: EngineSelection) {
    manager.set_sca_only(engines.sca_only);
    manager.set_static_only(engines.static_only);
    manager.set_third_party(engines.third_party);
    manager.set_source_code_only(engines.source_code_only);
    if engines.no_secrets {
        manager.set_secrets_disabled(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::irx::testing::FakeGenerator;
    use std::sync::Arc;

    #[test]
    fn test_configure_manager() {
        let mut manager = StaticScanManager::new("/src", Arc::new(FakeGenerator::new()));
        configure_manager(
            &mut manager,
            EngineSelection {
                sca_only: true,
                no_secrets: true,
                ..Default::default()
            },
        );

        let options = manager.options();
        assert!(options.open_source_only);
        assert!(!options.static_analysis_only);
        assert!(options.secrets_disabled);
        assert!(!options.secrets_enabled);
    }
}
