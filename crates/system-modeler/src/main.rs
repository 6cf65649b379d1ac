use std::process::ExitCode;

fn main() -> ExitCode {
    service_entrypoints::run_service("System Modeler", system_modeler::run)
}
