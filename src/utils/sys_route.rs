use std::process::Command;

pub struct SysRoute;

impl SysRoute {
    pub fn new() -> Self {
        Self
    }

    /// Routes the overlay subnet through the TUN interface
    /// - subnet: destination CIDR (e.g., "10.0.0.0/24")
    /// - interface: kernel interface name (e.g., "tun0", "utun4")
    pub fn add(&self, subnet: &str, interface: &str) -> crate::Result<()> {
        self.add_route(subnet, interface)
    }

    #[cfg(target_os = "linux")]
    fn add_route(&self, subnet: &str, interface: &str) -> crate::Result<()> {
        // replace, not add: the kernel installs a connected route for the
        // interface address itself, and a restart must not fail on it
        let output = Command::new("ip")
            .args(["route", "replace", subnet, "dev", interface])
            .output()
            .map_err(|e| format!("Failed to execute ip command: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("Failed to add route: {}", stderr).into());
        }
        Ok(())
    }

    #[cfg(target_os = "macos")]
    fn add_route(&self, subnet: &str, interface: &str) -> crate::Result<()> {
        let output = Command::new("route")
            .args(["-n", "add", "-net", subnet, "-interface", interface])
            .output()
            .map_err(|e| format!("Failed to execute route command: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("File exists") {
                tracing::debug!("route already present: {} via {}", subnet, interface);
                return Ok(());
            }
            return Err(format!("Failed to add route: {}", stderr).into());
        }
        Ok(())
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    fn add_route(&self, _subnet: &str, _interface: &str) -> crate::Result<()> {
        Err("Route management is not supported on this platform".into())
    }
}

impl Default for SysRoute {
    fn default() -> Self {
        Self::new()
    }
}
