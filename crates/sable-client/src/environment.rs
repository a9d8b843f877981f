// Cloud environment metadata: DNS suffixes and management endpoints per cloud.

/// Endpoints for one cloud deployment.
///
/// ```
/// use sable_client::Environment;
///
/// let env = Environment::from_name("azurechinacloud").expect("known cloud");
/// assert_eq!(env.service_bus_endpoint_suffix, "servicebus.chinacloudapi.cn");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub name: String,
    pub service_bus_endpoint_suffix: String,
    pub resource_manager_endpoint: String,
}

impl Environment {
    pub fn new(
        name: impl Into<String>,
        service_bus_endpoint_suffix: impl Into<String>,
        resource_manager_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            service_bus_endpoint_suffix: service_bus_endpoint_suffix.into(),
            resource_manager_endpoint: resource_manager_endpoint.into(),
        }
    }

    pub fn public_cloud() -> Self {
        Self::new(
            "AzurePublicCloud",
            "servicebus.windows.net",
            "https://management.azure.com/",
        )
    }

    pub fn china_cloud() -> Self {
        Self::new(
            "AzureChinaCloud",
            "servicebus.chinacloudapi.cn",
            "https://management.chinacloudapi.cn/",
        )
    }

    pub fn us_government_cloud() -> Self {
        Self::new(
            "AzureUSGovernmentCloud",
            "servicebus.usgovcloudapi.net",
            "https://management.usgovcloudapi.net/",
        )
    }

    pub fn german_cloud() -> Self {
        Self::new(
            "AzureGermanCloud",
            "servicebus.cloudapi.de",
            "https://management.microsoftazure.de/",
        )
    }

    /// Look up a well-known cloud by its canonical name, ignoring case.
    pub fn from_name(name: &str) -> Option<Self> {
        [
            Self::public_cloud(),
            Self::china_cloud(),
            Self::us_government_cloud(),
            Self::german_cloud(),
        ]
        .into_iter()
        .find(|env| env.name.eq_ignore_ascii_case(name.trim()))
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::public_cloud()
    }
}
