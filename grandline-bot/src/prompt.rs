//! Timeout-bounded questions to a single user.

use std::time::Duration;

use rand::Rng;
use tracing::{info, warn};

use grandline_core::{ChannelId, GrandlineError, Result, UserId};

use crate::messages::MessageSink;
use crate::session::PendingPrompts;

/// The answer a prompt settled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    /// Index into the offered options.
    pub index: usize,
    /// The option itself.
    pub option: String,
    /// True when nobody answered in time and the default was taken.
    pub timed_out: bool,
}

/// A question for one user.
#[derive(Debug, Clone, Copy)]
pub struct Question<'a> {
    /// Where to ask.
    pub channel: ChannelId,
    /// Who must answer.
    pub user: UserId,
    /// The question text.
    pub text: &'a str,
    /// Accepted answers, matched case-insensitively.
    pub options: &'a [&'a str],
    /// How long to wait.
    pub timeout: Duration,
}

/// Post `question` and wait at most its timeout for the user's reply.
///
/// On expiry, or if the prompt is closed underneath us, a uniformly random
/// option is chosen and `timed_out` is set. The wait never outlives the
/// timeout.
///
/// # Errors
/// `InvalidArgument` if there are no options or the user already has an
/// open prompt in this channel; `TransientIo` if the question cannot be
/// posted.
pub async fn await_choice<R: Rng>(
    prompts: &PendingPrompts,
    sink: &MessageSink,
    question: Question<'_>,
    rng: &parking_lot::Mutex<R>,
) -> Result<Choice> {
    let Question {
        channel,
        user,
        text,
        options,
        timeout,
    } = question;
    if options.is_empty() {
        return Err(GrandlineError::InvalidArgument("a prompt needs options".into()));
    }
    let rx = prompts.register(channel, user, options)?;
    let ask = format!(
        "{text} Reply with {} within {} seconds.",
        options.join(" / "),
        timeout.as_secs()
    );
    if let Err(e) = sink.text(channel, ask).await {
        prompts.cancel(channel, user);
        return Err(e);
    }

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(index)) if index < options.len() => {
            info!(channel = %channel, user = %user, choice = options[index], "prompt answered");
            Ok(Choice {
                index,
                option: options[index].to_string(),
                timed_out: false,
            })
        }
        outcome => {
            prompts.cancel(channel, user);
            let expired = GrandlineError::TimeoutExpired(timeout.as_secs());
            let index = rng.lock().gen_range(0..options.len());
            warn!(
                channel = %channel,
                user = %user,
                closed = outcome.is_ok(),
                error = %expired,
                default = options[index],
                "prompt fell back to a random default"
            );
            Ok(Choice {
                index,
                option: options[index].to_string(),
                timed_out: true,
            })
        }
    }
}
