#![no_main]

use boson_rpc::core::encoding::ValueCodec;
use boson_rpc::protocol::message::Message;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Envelope and value decoding must reject garbage without panicking
    let codec = ValueCodec::default();
    let _ = Message::decode(data, &codec);
});
