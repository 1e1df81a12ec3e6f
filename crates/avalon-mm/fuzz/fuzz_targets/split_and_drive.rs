#![no_main]

use avalon_mm::{
    split_beats, AvalonBus, AvalonMaster, Clock, IssuePolicy, MasterConfig, ReadRequest, Signal,
    SignalBank, Strobe, WriteRequest,
};
use libfuzzer_sys::fuzz_target;

/// Responder whose inputs come straight from the fuzz corpus, one byte per edge.
struct ScriptedResponder<'a> {
    script: &'a [u8],
    position: usize,
}

impl Clock<SignalBank> for ScriptedResponder<'_> {
    fn rising_edge(&mut self, _bus: &mut SignalBank) {}

    fn settle(&mut self, bus: &mut SignalBank) {
        let byte = self
            .script
            .get(self.position % self.script.len().max(1))
            .copied()
            .unwrap_or(0);
        self.position += 1;
        bus.drive_u64(Signal::WaitRequest, u64::from(byte & 1));
        bus.drive_u64(Signal::ReadDataValid, u64::from(byte >> 1 & 1));
        bus.drive_u64(Signal::WriteResponseValid, u64::from(byte >> 2 & 1));
        bus.drive_u64(Signal::Response, u64::from(byte >> 3 & 0b11));
        bus.drive(Signal::ReadData, &[byte; 128]);
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }

    let data_width = 8_u32 << (data[0] % 8);
    let address_width = u32::from(data[1] % 64) + 1;
    let address = u64::from(u32::from_le_bytes([data[2], data[3], data[4], data[5]]));
    let length = usize::from(data[6]);
    let control = data[7];
    let script = &data[8..];

    let word_bytes = (data_width / 8) as usize;
    let _ = split_beats(address, length, word_bytes, u64::MAX);

    let policy = match control % 3 {
        0 => IssuePolicy::Gapped,
        1 => IssuePolicy::Pipelined,
        _ => IssuePolicy::Serialized,
    };
    let config = MasterConfig::default()
        .with_timeout_cycles(i64::from(control >> 2 & 0x0F))
        .with_exception_enabled(control & 0x40 == 0)
        .with_issue_policy(policy);
    let bank = SignalBank::new(address_width, data_width);
    let responder = ScriptedResponder {
        script,
        position: 0,
    };
    let Ok(mut master) = AvalonMaster::new(bank, responder, &config) else {
        return;
    };

    let payload = script.get(..length).unwrap_or(script).to_vec();
    let _ = master.write_nowait(
        &WriteRequest::new(address, payload).with_strobe(Strobe::Lanes(u128::from(control))),
    );
    let _ = master.read_nowait(&ReadRequest::new(address).with_length(length));
    if control & 0x80 != 0 {
        let _ = master.clear();
    }
    for _ in 0..64 {
        if master.step().is_err() {
            break;
        }
    }
});
