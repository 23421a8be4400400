//! Handlers for the V2 command set.
//!
//! | Command            | Phase      | Effect                                   |
//! |--------------------|------------|------------------------------------------|
//! | `SUB topic chan`   | Init       | subscribe and start the delivery loop    |
//! | `RDY [count]`      | Subscribed | replace the delivery loop's credit       |
//! | `FIN id`           | Subscribed | finish an in-flight message              |
//! | `REQ id`           | Subscribed | requeue an in-flight message             |
//!
//! None of them produce a response payload; success is silent.

use crate::{
    client::Client,
    dispatch::CommandResult,
    error::ClientError,
    state::{Phase, Subscription},
};

/// `SUB <topic> <channel>`
pub(crate) fn sub(client: &mut Client, params: &[&str]) -> CommandResult {
    if client.phase() != Phase::Init {
        return Err(ClientError::Invalid);
    }

    let [_, topic, channel, ..] = params else {
        return Err(ClientError::Invalid);
    };
    if topic.is_empty() {
        return Err(ClientError::BadTopic);
    }
    if channel.is_empty() {
        return Err(ClientError::BadChannel);
    }

    client.subscribe(topic, channel)?;
    Ok(None)
}

/// `RDY [count]`, count defaulting to 1.
pub(crate) fn rdy(client: &mut Client, params: &[&str]) -> CommandResult {
    let subscription = subscribed(client)?;

    let count = match params.get(1) {
        Some(raw) => raw.parse::<i64>()?,
        None => 1,
    };
    let max = i64::from(client.config().max_ready_count);
    if !(0..=max).contains(&count) {
        return Err(ClientError::Invalid);
    }

    subscription.credit.send_replace(count as u32);
    Ok(None)
}

/// `FIN <message-id>`
pub(crate) fn fin(client: &mut Client, params: &[&str]) -> CommandResult {
    let subscription = subscribed(client)?;
    let [_, id, ..] = params else {
        return Err(ClientError::Invalid);
    };

    subscription.channel.finish(id)?;
    Ok(None)
}

/// `REQ <message-id>`
pub(crate) fn req(client: &mut Client, params: &[&str]) -> CommandResult {
    let subscription = subscribed(client)?;
    let [_, id, ..] = params else {
        return Err(ClientError::Invalid);
    };

    subscription.channel.requeue(id)?;
    Ok(None)
}

fn subscribed(client: &Client) -> Result<&Subscription, ClientError> {
    client.state().subscription().ok_or(ClientError::Invalid)
}
