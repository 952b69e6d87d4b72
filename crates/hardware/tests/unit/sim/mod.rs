/// Coherence between lanes under MOESI and Dragon.
pub mod coherence;
