//! Deterministic viewer scenarios.

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// VSIM-001: Hovering vehicle, displayed pose must equal truth
    Hover,

    /// VSIM-002: Circling vehicle, display lag bounded by the poll cadence
    Circuit,

    /// VSIM-003: Link severed mid-flight, manual fallback takes over
    LinkLoss,

    /// VSIM-004: No link at all, manual control only
    Offline,

    /// VSIM-005: Lossy link and erratic frame timing
    Jitter,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Hover,
            ScenarioId::Circuit,
            ScenarioId::LinkLoss,
            ScenarioId::Offline,
            ScenarioId::Jitter,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Hover => "hover",
            ScenarioId::Circuit => "circuit",
            ScenarioId::LinkLoss => "link_loss",
            ScenarioId::Offline => "offline",
            ScenarioId::Jitter => "jitter",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Hover => "Static hover at 60 Hz, pose and rotor rate must match the simulator",
            ScenarioId::Circuit => "10 m circle at 2.5 m/s, display error bounded by one poll plus one frame",
            ScenarioId::LinkLoss => "Link severed halfway, vehicle drops to manual and stops polling",
            ScenarioId::Offline => "Simulator unreachable, forward key flies the vehicle at 2 m/s",
            ScenarioId::Jitter => "30% telemetry loss and 0-120 ms frame intervals",
        }
    }

    /// Whether the scenario needs the simulator to accept connections.
    pub fn needs_link(&self) -> bool {
        !matches!(self, ScenarioId::Offline)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hover" | "vsim-001" => Ok(ScenarioId::Hover),
            "circuit" | "vsim-002" => Ok(ScenarioId::Circuit),
            "link_loss" | "linkloss" | "vsim-003" => Ok(ScenarioId::LinkLoss),
            "offline" | "vsim-004" => Ok(ScenarioId::Offline),
            "jitter" | "vsim-005" => Ok(ScenarioId::Jitter),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
