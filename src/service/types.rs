use serde::{Deserialize, Serialize};

/// Registry name the compute service is published under.
pub const REGISTRY_NAME: &str = "lpi.server.rmi";

/// Prefix of every method name, e.g. `Compute.ping`.
pub const SERVICE_NAME: &str = "Compute";

/// Marker prepended to every echoed text.
pub const ECHO_PREFIX: &str = "ECHO:";

/// Fully qualified method names.
pub mod methods {
    pub const PING: &str = "Compute.ping";
    pub const ECHO: &str = "Compute.echo";
    pub const EXECUTE_TASK: &str = "Compute.execute_task";
    pub const TIME_SORT_EXECUTION: &str = "Compute.time_sort_execution";

    pub const ALL: [&str; 4] = [PING, ECHO, EXECUTE_TASK, TIME_SORT_EXECUTION];
}

/// Request for the echo operation. `text` is optional on the wire so a
/// missing value can be rejected as an argument fault.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EchoRequest {
    pub text: Option<String>,
}

/// Response from the echo operation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct EchoResponse {
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_names_are_namespaced_by_service() {
        for method in methods::ALL {
            let (service, name) = method.split_once('.').unwrap();
            assert_eq!(service, SERVICE_NAME);
            assert!(!name.is_empty());
        }
    }
}
