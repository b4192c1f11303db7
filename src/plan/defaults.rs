//! Built-in plan for the simulated security-module stack.

use std::path::PathBuf;

use super::{BootstrapPlan, PlanError, ReadinessCheck, ServiceDescriptor};

pub const DEVICE_SIMULATOR: &str = "device-simulator";
pub const BUS_DAEMON: &str = "bus-daemon";
pub const RESOURCE_MANAGER: &str = "resource-manager-daemon";
pub const MESSAGE_BROKER: &str = "message-broker";

pub const SIMULATOR_PORT: u16 = 2321;
pub const BROKER_PORT: u16 = 5672;
pub const SYSTEM_BUS_SOCKET: &str = "/run/dbus/system_bus_socket";
pub const RESOURCE_MANAGER_BUS_NAME: &str = "com.intel.tss2.Tabrmd";

/// Knobs for the built-in plan.
#[derive(Debug, Clone)]
pub struct DefaultPlanOptions {
    /// Simulator state directory.
    pub state_dir: PathBuf,
    pub simulator_port: u16,
    /// Launch a bus daemon. When off, the resource manager registers on a
    /// bus provided by the host.
    pub with_bus: bool,
    /// Make the bus daemon step hard and gate the resource manager on it.
    pub require_bus: bool,
    pub with_broker: bool,
}

impl Default for DefaultPlanOptions {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("/tmp/tpmstate"),
            simulator_port: SIMULATOR_PORT,
            with_bus: true,
            require_bus: false,
            with_broker: false,
        }
    }
}

pub fn default_descriptors(options: &DefaultPlanOptions) -> Vec<ServiceDescriptor> {
    let port = options.simulator_port;
    let mut descriptors = Vec::with_capacity(4);

    descriptors.push(
        ServiceDescriptor::new(DEVICE_SIMULATOR, "swtpm", ReadinessCheck::TcpPort(port)).args([
            "socket".to_string(),
            "--tpm2".to_string(),
            "--tpmstate".to_string(),
            format!("dir={}", options.state_dir.display()),
            "--server".to_string(),
            format!("type=tcp,port={}", port),
            "--ctrl".to_string(),
            format!("type=tcp,port={}", port.saturating_add(1)),
            "--flags".to_string(),
            "not-need-init,startup-clear".to_string(),
        ]),
    );

    if options.with_bus {
        let bus = ServiceDescriptor::new(
            BUS_DAEMON,
            "dbus-daemon",
            ReadinessCheck::SocketPath(PathBuf::from(SYSTEM_BUS_SOCKET)),
        )
        .args(["--system", "--nofork", "--nopidfile"]);
        descriptors.push(if options.require_bus { bus } else { bus.best_effort() });
    }

    let mut resource_manager = ServiceDescriptor::new(
        RESOURCE_MANAGER,
        "tpm2-abrmd",
        ReadinessCheck::BusName(RESOURCE_MANAGER_BUS_NAME.to_string()),
    )
    .args([
        "--allow-root".to_string(),
        format!("--tcti=swtpm:host=localhost,port={}", port),
    ])
    .depends_on(DEVICE_SIMULATOR);
    // A best-effort bus only orders the launch; a required one gates it.
    if options.with_bus && options.require_bus {
        resource_manager = resource_manager.depends_on(BUS_DAEMON);
    }
    descriptors.push(resource_manager);

    if options.with_broker {
        descriptors.push(
            ServiceDescriptor::new(MESSAGE_BROKER, "rabbitmq-server", ReadinessCheck::TcpPort(BROKER_PORT))
                .best_effort(),
        );
    }

    descriptors
}

pub fn default_plan(options: &DefaultPlanOptions) -> Result<BootstrapPlan, PlanError> {
    BootstrapPlan::new(default_descriptors(options))
}
