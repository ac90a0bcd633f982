#![no_main]

use libfuzzer_sys::fuzz_target;
use yarisc_core::{
    AddressSpace, Decoder, Simulator, SimulatorConfig, Word,
};

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    let primary = Word::from_le_bytes([data[0], data[1]]);
    let extension = Word::from_le_bytes([data[2], data[3]]);

    // Decoding is total: any word pair either decodes or reports a precise
    // reason, and a valid decode re-encodes to the same words.
    let wanted = Decoder::wants_extension(primary).then_some(extension);
    if let Ok(decoded) = Decoder::decode(primary, wanted) {
        let (encoded, ext) = decoded.encode();
        assert_eq!(encoded, primary);
        assert_eq!(ext, wanted);
    }

    // Stepping arbitrary memory never panics; malformed programs surface as
    // simulated trap outcomes.
    let mut mem = AddressSpace::flat();
    if mem.write_image(0, data).is_err() {
        return;
    }
    let mut sim = match Simulator::new(mem, SimulatorConfig::default()) {
        Ok(sim) => sim,
        Err(_) => return,
    };
    let _ = sim.run(64);
});
