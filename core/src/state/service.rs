use std::sync::Arc;

use crate::agent_services::ActionExecutor;
use crate::agent_services::ConfirmationGate;
use crate::agent_services::ResponseChannel;

pub(crate) struct SessionServices {
    pub(crate) response_channel: Arc<dyn ResponseChannel>,
    pub(crate) confirmation_gate: Arc<dyn ConfirmationGate>,
    pub(crate) executor: Arc<dyn ActionExecutor>,
}
