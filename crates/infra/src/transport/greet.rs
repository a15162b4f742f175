//! Greet service handlers

use std::time::Duration;

use futures::stream::{self, StreamExt};
use rpcshield_core::{Payload, PayloadStream, StreamHandle};
use rpcshield_domain::constants::STREAM_BUFFER;
use rpcshield_domain::{
    GreetEveryoneRequest, GreetEveryoneResponse, GreetManyTimesRequest, GreetManyTimesResponse,
    GreetRequest, GreetResponse, GreetWithDeadlineRequest, GreetWithDeadlineResponse,
    LongGreetRequest, LongGreetResponse, Status,
};
use tokio::sync::mpsc;
use tracing::debug;

use super::{decode, encode};

/// Responses produced by one `GreetManyTimes` call.
pub const GREET_MANY_TIMES_COUNT: usize = 10;

pub(super) fn greet(request: Payload) -> Result<Payload, Status> {
    let request: GreetRequest = decode(request)?;
    encode(&GreetResponse { result: format!("Hello {}", request.greeting.first_name) })
}

/// Answers after `delay`. Dropping the future abandons the call.
pub(super) async fn greet_with_deadline(
    request: Payload,
    delay: Duration,
) -> Result<Payload, Status> {
    let request: GreetWithDeadlineRequest = decode(request)?;
    tokio::time::sleep(delay).await;
    encode(&GreetWithDeadlineResponse {
        result: format!("Hello {}", request.greeting.first_name),
    })
}

pub(super) fn greet_many_times(
    request: Payload,
    interval: Duration,
) -> Result<PayloadStream, Status> {
    let request: GreetManyTimesRequest = decode(request)?;
    let first_name = request.greeting.first_name;

    let replies = (1..=GREET_MANY_TIMES_COUNT).map(move |i| {
        encode(&GreetManyTimesResponse { result: format!("Hello {first_name} number {i}") })
    });

    Ok(stream::iter(replies)
        .enumerate()
        .then(move |(index, reply)| async move {
            if index > 0 && !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
            reply
        })
        .boxed())
}

/// Collects every greeting and answers once the client closes.
pub(super) fn long_greet() -> StreamHandle {
    let (outbound, mut requests) = mpsc::channel::<Payload>(STREAM_BUFFER);
    let (replies, inbound) = mpsc::channel(STREAM_BUFFER);

    tokio::spawn(async move {
        let mut result = String::new();
        let mut received = 0usize;
        while let Some(message) = requests.recv().await {
            match decode::<LongGreetRequest>(message) {
                Ok(request) => {
                    result.push_str(&format!("Hello {}! ", request.greeting.first_name));
                    received += 1;
                }
                Err(status) => {
                    let _ = replies.send(Err(status)).await;
                    return;
                }
            }
        }
        debug!(received, "long greet complete");
        let _ = replies.send(encode(&LongGreetResponse { result })).await;
    });

    StreamHandle { outbound, inbound }
}

/// Answers each greeting as it arrives, ending when the client closes.
pub(super) fn greet_everyone() -> StreamHandle {
    let (outbound, mut requests) = mpsc::channel::<Payload>(STREAM_BUFFER);
    let (replies, inbound) = mpsc::channel(STREAM_BUFFER);

    tokio::spawn(async move {
        while let Some(message) = requests.recv().await {
            let reply = decode::<GreetEveryoneRequest>(message).and_then(|request| {
                encode(&GreetEveryoneResponse {
                    result: format!("Hello {}! ", request.greeting.first_name),
                })
            });
            let failed = reply.is_err();
            if replies.send(reply).await.is_err() || failed {
                return;
            }
        }
    });

    StreamHandle { outbound, inbound }
}
