//! Generation pipeline: plan, then render both halves.

use thunk_interface::Interface;
use thunk_layout::GuestAbi;

use crate::error::Result;
use crate::model::ThunkPlan;
use crate::policy::Planner;
use crate::render::{guest::render_guest, host::render_host};

/// Output of a successful generation run.
#[derive(Debug, Clone)]
pub struct GeneratedThunks {
    /// Source to `include!` into the guest crate.
    pub guest: String,
    /// Source to `include!` into the host crate.
    pub host: String,
    /// The checked plan both halves were rendered from.
    pub plan: ThunkPlan,
}

/// Generate the guest and host thunk sources for one interface library.
///
/// Either both halves are produced or an error is returned; there is no
/// partial output.
pub fn generate(interface: &Interface, abi: GuestAbi) -> Result<GeneratedThunks> {
    let plan = Planner::new(interface, abi).plan()?;
    let guest = render_guest(&plan)?;
    let host = render_host(&plan)?;
    log::info!(
        "generated thunks for {} ({} functions, {} callbacks, {abi} guest)",
        plan.library,
        plan.functions.len(),
        plan.callbacks.len()
    );
    Ok(GeneratedThunks { guest, host, plan })
}
