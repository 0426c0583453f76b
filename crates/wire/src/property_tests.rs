// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Property tests for framing of arbitrary payloads.

use proptest::prelude::*;
use swarm_core::Handle;

use super::*;

proptest! {
    #[test]
    fn channel_bytes_survive_a_frame(data in proptest::collection::vec(any::<u8>(), 0..4096)) {
        let req = PeerRequest::SendChannel { handle: Handle(1), name: "c".into(), job: None, data };
        let encoded = encode(&req).expect("encode");
        let decoded: PeerRequest = decode(&encoded).expect("decode");
        prop_assert_eq!(decoded, req);
    }

    #[test]
    fn info_text_survives_a_frame(text in ".*") {
        let message = swarm_core::Message::new(swarm_core::MessageBody::info(text));
        let req = Request::SendMessage { handle: Handle(2), message };
        let encoded = encode(&req).expect("encode");
        let decoded: Request = decode(&encoded).expect("decode");
        prop_assert_eq!(decoded, req);
    }
}
