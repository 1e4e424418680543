use reel_config::ReelConfig;

use crate::cli::GlobalFlags;
use crate::output::output;

/// Handle `reel config`.
pub fn handle(config: &ReelConfig, flags: &GlobalFlags) -> anyhow::Result<()> {
    output(config, flags.format)
}
