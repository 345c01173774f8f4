//! Decision hub: turns raw user text into a [`DecSnapshot`].
//!
//! Intensity (0-10) comes from a lexical heuristic, vulnerability from a
//! fixed pattern list plus externally supplied flags. Openness, steps and
//! the memory flags are pure functions of those two values.
//!
//! The hub never fails: blank or unrecognized text yields intensity 0 or
//! the 3/7 baseline, and openness 1.

use promptweave_core::decision::{DecSnapshot, DecisionDebug, MEMORY_THRESHOLD, Openness, Step};
use promptweave_core::text::normalize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::lexicon::Lexicon;

/// Flags copied into the snapshot when set by the caller.
pub const USE_MEMORIES: &str = "use_memories";
pub const PATTERN_SYNTHESIS: &str = "pattern_synthesis";

/// Derives openness from intensity and vulnerability.
pub fn derive_openness(intensity: u8, is_vulnerable: bool) -> Openness {
    if intensity >= 7 && is_vulnerable {
        Openness::Deep
    } else if intensity >= 5 {
        Openness::Moderate
    } else {
        Openness::Surface
    }
}

pub fn derive_steps(openness: Openness) -> Vec<Step> {
    match openness {
        Openness::Deep => vec![Step::V, Step::I, Step::V, Step::A, Step::Pause],
        Openness::Moderate => vec![Step::V, Step::I, Step::A],
        Openness::Surface => vec![Step::V, Step::A],
    }
}

/// Flags that mark a message as vulnerable, with their debug label.
const VULNERABILITY_FLAGS: [(&str, &str); 4] = [
    ("vulnerability", "flag:vulnerability"),
    ("shame", "flag:shame"),
    ("guilt", "flag:guilt"),
    ("self_criticism", "flag:self_criticism"),
];

struct FlagRule {
    name: &'static str,
    lexicon: Lexicon,
}

/// Lexical state derivation. Build once and share.
pub struct DecisionHub {
    primary_emotions: Lexicon,
    intensifiers: Lexicon,
    crisis_triggers: Lexicon,
    work_context: Lexicon,
    relationship_context: Lexicon,
    vulnerability: Lexicon,
    flags: Vec<FlagRule>,
    crisis_parts: [&'static str; 4],
}

impl DecisionHub {
    pub fn new() -> Self {
        let flag = |name: &'static str, patterns: &[&str]| FlagRule {
            name,
            lexicon: Lexicon::new(patterns),
        };

        Self {
            primary_emotions: Lexicon::new(&[
                r"triste|tristeza|tristonho|melancol",
                r"depress",
                r"ansiedad|angustiad",
                r"medo|assustad|apavorad",
                r"raiva|raivos|furios|irritad|revoltad",
                r"frustra",
                r"culpa|culpad|remorso",
                r"vergonha|envergonhad|humilhad",
                r"solidao|sozinh|isolad",
                r"desesper",
            ]),
            intensifiers: Lexicon::new(&[
                r"muito\s+(triste|angustia|assusta|furioso|frustrado|vazio|sozinho|deprimido)",
                r"demais|d+emais",
                r"pesada|profunda|intensa|avassaladora",
                r"nao\s+aguento|nao\s+consigo|insuport",
                r"tudo\s+(esta|e)\s+(errado|ruim|pessimo|horrivel|impossivel|vazio)",
            ]),
            crisis_triggers: Lexicon::new(&[
                r"panico",
                r"crise",
                r"desesper",
                r"insuport",
                r"vontade de sumir",
                r"explod",
                r"taquicard|batimentos",
                r"ansiedad|angust",
                r"muito\s+(triste|ansioso|assustado|furioso|frustrado|vazio|sozinho|perdido|confuso)",
                r"tristeza?\s+(pesada|profunda|intensa|avassaladora)",
                r"me sinto\s+(terrivel|horrivel|pior|muito mal|tao mal|mal demais|pessimo)",
                r"estou\s+(muito\s+)?(triste|angustiado|desesperado|devastado|arrasado|arruinado|destruido)",
                r"nao (aguento|consigo|resisto|funciono|gosto|confio)",
                r"tudo (esta|e)\s+(errado|ruim|pessimo|horrivel|impossivel|vazio)",
                r"sinto\s+(muito\s+)?(fraco|impotente|inadequado|fracasso|incapaz|inutil|insignificante)",
                r"me(u|a)?\s+(culpa|medo|vergonha|vazio|vacuo|escuridao)",
                r"nao\s+(conseguir|merec)",
                r"trabalho.{0,50}(triste|angustia|frustra|estressa|preocupa|infeliz|mal)",
                r"relacionamento.{0,50}(acabou|terminou|toxic|machuca|doi|sofr)",
                r"!{2,}|\?{2,}",
                r"(muito|demais|d+emais)\s+(\w+\s+){0,2}(mal|ruim|horrivel|pessimo|pior)",
            ]),
            work_context: Lexicon::new(&[r"trabalho|carreira|emprego|chefe|colega"]),
            relationship_context: Lexicon::new(&[
                r"relacionamento|namorad|parceir|casamento|familia",
            ]),
            vulnerability: Lexicon::new(&[
                r"me (sinto|senti) vulneravel",
                r"abrir meu? coracao",
                r"dificil de falar",
                r"vergonha",
                r"medo de julgamento",
                r"expost[oa]",
                r"me mostrar como sou",
                r"mostrar fraqueza",
                r"medo de parecer fraco",
                r"me abrir",
            ]),
            flags: vec![
                flag(
                    "curiosity",
                    &[r"\b(como|por que|porque|pra que|para que|e se|poderia|podes|pode)\b"],
                ),
                flag(
                    "practical_request",
                    &[r"\b(passos?|tutorial|guia|checklist|lista|exemplo|modelo|template|o que faco|o que fazer|me ajuda)\b"],
                ),
                flag(
                    "classification_question",
                    &[r"\b(nivel|abertura|intensidade|classificacao|classificar)\b"],
                ),
                flag(
                    "greeting",
                    &[r"\b(oi+|oie+|ola+|alo+|opa+|salve|bom dia|boa tarde|boa noite|boa madrugada)\b"],
                ),
                flag(
                    "factual",
                    &[r"\b(que dia|que data|horario|endereco|onde fica|preco|valor|numero|cpf|rg|link|url|site|telefone|contato|confirmar|confirmacao|agenda|quando|que horas)\b"],
                ),
                flag(
                    "fatigue",
                    &[r"\b(cansad[ao]|sem energia|esgotad[ao]|exaust[ao]|acabad[ao]|saturad[ao])\b"],
                ),
                flag(
                    "venting",
                    &[r"\b(so desabafando|queria desabafar|so queria falar|nao precisa responder|nao quero conselho|nao preciso de intervencao)\b"],
                ),
                flag(
                    "urgency",
                    &[r"\b(preciso resolver ja|nao sei mais o que fazer|socorro|urgente|agora|pra ontem)\b"],
                ),
                flag(
                    "high_emotion_language",
                    &[r"\b(nao aguento|no limite|explodindo|desesperad[oa]|muito ansios[oa]|panico|crise|tremend[oa])\b"],
                ),
                flag("ideation", &[r"suicid|me matar|tirar minha vida|acabar com tudo"]),
                flag("despair", &[r"desesper|sem saida|no limite"]),
                flag("emptiness", &[r"\bvazio\b|\bsem sentido\b|\bnada faz sentido\b"]),
                flag(
                    "self_devaluation",
                    &[r"\b(nao presto|nao valho|sou um lixo|sou horrivel)\b"],
                ),
                flag("shame", &[r"\b(vergonha|humilhacao|me escondo|me esconder)\b"]),
                flag(
                    "vulnerability",
                    &[r"\b(vulneravel|abrir meu coracao|medo de me abrir)\b"],
                ),
                flag(
                    "active_defenses",
                    &[r"\b(racionalizo|racionalizando|minimizo|minimizando|faco piada|mudo de assunto|fugir do tema)\b"],
                ),
                flag(
                    "confrontation",
                    &[r"\b(brigar|bater de frente|comprar briga|contra-ataco|contra ataco|contra-atacar)\b"],
                ),
                flag(
                    "avoidance",
                    &[r"\b(evito|evitando|fujo|fugindo|adio|procrastino|adiar|adiando|adiamento)\b"],
                ),
                flag(
                    "self_criticism",
                    &[r"\b(sou um lixo|sou horrivel|me detesto|sou fraco|sou fraca|falhei|fracassei)\b"],
                ),
                flag("guilt", &[r"\b(culpa|culpada|culpado|me sinto culp[oa])\b"]),
                flag(
                    "catastrophizing",
                    &[r"\b(catastrof\w*|vai dar tudo errado|nunca vai melhorar|tudo acaba|sempre ruim|nada funciona)\b"],
                ),
            ],
            crisis_parts: ["ideation", "despair", "emptiness", "self_devaluation"],
        }
    }

    /// Estimate emotional intensity on a 0-10 scale.
    pub fn estimate_intensity(&self, text: &str) -> u8 {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return 0;
        }
        let t = normalize(trimmed);
        let mut intensity: u32 = 0;

        let primary = self.primary_emotions.any(&t);
        if primary {
            intensity += 5;
        }
        intensity += self.intensifiers.count(&t).min(2) as u32;

        let length = trimmed.chars().count();
        if length >= 100 {
            intensity += 1;
        }
        if length >= 200 {
            intensity += 1;
        }
        if t.contains("!!") {
            intensity += 1;
        }
        if t.contains("...") || t.contains('…') {
            intensity += 1;
        }
        if primary && self.work_context.any(&t) {
            intensity += 1;
        }
        if primary && self.relationship_context.any(&t) {
            intensity += 1;
        }

        if intensity == 0 {
            intensity = if length >= 180 || self.crisis_triggers.any(&t) {
                7
            } else {
                3
            };
        }
        intensity.min(10) as u8
    }

    /// Lexical flags for `text`, merged with `external` flags (either side
    /// setting a flag wins).
    pub fn derive_flags(&self, text: &str, external: &BTreeMap<String, bool>) -> BTreeMap<String, bool> {
        let t = normalize(text);
        let mut flags: BTreeMap<String, bool> = self
            .flags
            .iter()
            .map(|rule| (rule.name.to_string(), rule.lexicon.any(&t)))
            .collect();

        if text.trim_end().ends_with('?') {
            flags.insert("curiosity".into(), true);
        }
        let crisis = self
            .crisis_parts
            .iter()
            .any(|name| flags.get(*name).copied().unwrap_or(false));
        flags.insert("crisis".into(), crisis);

        for (name, value) in external {
            let entry = flags.entry(name.trim().to_lowercase()).or_insert(false);
            *entry = *entry || *value;
        }
        flags
    }

    fn detect_vulnerability(&self, text: &str, flags: &BTreeMap<String, bool>) -> Vec<String> {
        let mut signals: Vec<String> = VULNERABILITY_FLAGS
            .iter()
            .filter(|(flag, _)| flags.get(*flag).copied().unwrap_or(false))
            .map(|(_, label)| label.to_string())
            .collect();
        if let Some(pattern) = self.vulnerability.first(&normalize(text)) {
            signals.push(format!("lexical:{pattern}"));
        }
        signals
    }

    /// Derive the snapshot for one turn.
    pub fn decide(&self, text: &str, external_flags: &BTreeMap<String, bool>) -> DecSnapshot {
        let intensity = self.estimate_intensity(text);
        let flags = self.derive_flags(text, external_flags);
        let vulnerability_signals = self.detect_vulnerability(text, &flags);
        let is_vulnerable = !vulnerability_signals.is_empty();
        let openness = derive_openness(intensity, is_vulnerable);
        let save_memory = intensity >= MEMORY_THRESHOLD;

        debug!(intensity, openness = %openness, is_vulnerable, "Decision derived");

        DecSnapshot {
            intensity,
            openness,
            is_vulnerable,
            steps: derive_steps(openness),
            save_memory,
            has_tech_block: save_memory,
            tags: BTreeSet::new(),
            domain: None,
            flags,
            debug: DecisionDebug {
                intensity_signals: vec![format!("heuristic:{intensity}")],
                vulnerability_signals,
                ..DecisionDebug::default()
            },
        }
    }
}

impl Default for DecisionHub {
    fn default() -> Self {
        Self::new()
    }
}
