pub const GENTLE_PRIMERS_DISPLAY_VERSION: &str = env!("GENTLE_PRIMERS_DISPLAY_VERSION");
pub const GENTLE_PRIMERS_BUILD_N: &str = env!("GENTLE_PRIMERS_BUILD_N");

pub fn version_cli_text() -> String {
    format!(
        "GENtle primers {}\nBuild {}\nNearest-neighbor primer design with equilibrium binding",
        GENTLE_PRIMERS_DISPLAY_VERSION, GENTLE_PRIMERS_BUILD_N
    )
}
