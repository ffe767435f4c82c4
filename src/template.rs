//! Document source for a safety plan, assembled from site data.
//!
//! The output is the Markdown-like dialect read by [`crate::markup::tokenize`].

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub const PLACEHOLDER: &str = "[DA COMPILARE]";
pub const MISSING_NARRATIVE: &str = "[SEZIONE DA GENERARE - Nessun contenuto AI disponibile]";

const SIGNATURE_FIELDS: &str = "Firma: _________________________________  Data: _________________";
const BLANK_CELL: &str = "_________________";

/// Accepts strings, numbers and booleans; `null` and absent fields become `None`.
fn loose_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Worker {
    #[serde(deserialize_with = "loose_string")]
    pub name: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub qualification: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub matricola: Option<String>,
}

/// Site record as handed over by the request layer. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SiteData {
    #[serde(deserialize_with = "loose_string")]
    pub site_name: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub company_name: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub company_vat: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub site_address: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub client: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub work_type: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub budget: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub start_date: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub end_date: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub num_workers: Option<String>,
    pub workers: Vec<Worker>,
    #[serde(deserialize_with = "loose_string")]
    pub responsabile_lavori: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub csp: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub cse: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub rspp: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub rls: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub medico: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub primo_soccorso: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub antincendio: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub direttore_tecnico: Option<String>,
    #[serde(deserialize_with = "loose_string")]
    pub preposto: Option<String>,
    pub selected_works: Vec<String>,
}

/// Present value, or `None` for missing, blank and "N/A".
pub fn present(value: Option<&str>) -> Option<&str> {
    let trimmed = value?.trim();
    (!trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("N/A")).then_some(trimmed)
}

pub fn placeholder(value: Option<&str>) -> String {
    present(value).unwrap_or(PLACEHOLDER).to_string()
}

fn v(value: &Option<String>) -> String {
    placeholder(value.as_deref())
}

/// Pipe characters would split a cell; newlines would end the row.
fn cell(value: String) -> String {
    value.replace('|', "/").replace(['\r', '\n'], " ")
}

struct Source {
    out: String,
}

impl Source {
    fn line(&mut self, text: impl AsRef<str>) {
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn blank(&mut self) {
        self.out.push('\n');
    }

    fn rule(&mut self) {
        self.blank();
        self.line("---");
        self.blank();
    }

    fn table(&mut self, header: &[&str], rows: impl IntoIterator<Item = Vec<String>>) {
        self.line(format!("| {} |", header.join(" | ")));
        self.line(format!(
            "|{}|",
            header.iter().map(|_| "---").collect::<Vec<_>>().join("|")
        ));
        for row in rows {
            let cells: Vec<String> = row.into_iter().map(cell).collect();
            self.line(format!("| {} |", cells.join(" | ")));
        }
    }

    fn field_table(&mut self, rows: &[(&str, String)]) {
        self.table(
            &["Campo", "Valore"],
            rows.iter()
                .map(|(label, value)| vec![label.to_string(), value.clone()]),
        );
    }

    fn text(&mut self, block: &str) {
        self.out.push_str(block.trim_start_matches('\n'));
    }
}

/// Builds the full document source. `narrative` fills the risk section;
/// without it the section carries a visible callout.
pub fn build_document_source(
    data: &SiteData,
    revision: &str,
    narrative: Option<&str>,
    issued_on: NaiveDate,
) -> String {
    let today = issued_on.format("%d/%m/%Y").to_string();
    let rev = present(Some(revision)).unwrap_or("1");
    let workers_count = if data.workers.is_empty() {
        v(&data.num_workers)
    } else {
        data.workers.len().to_string()
    };
    let mut s = Source { out: String::new() };

    s.line("# PIANO OPERATIVO DI SICUREZZA");
    s.line("## ai sensi del D.lgs 81/2008 e s.m.i. - Allegato XV");
    s.rule();
    s.line(format!("**REVISIONE {rev}** - Data: {today}"));
    s.blank();
    s.line(format!("**Impresa Esecutrice:** {}", v(&data.company_name)));
    s.line(format!("**P.IVA:** {}", v(&data.company_vat)));
    s.rule();

    s.line("## SEZIONE 1 - INTESTAZIONE E DATI IDENTIFICATIVI");
    s.blank();
    s.line(format!("### Piano Operativo di Sicurezza - Revisione {rev}"));
    s.blank();
    s.text(INTRO);
    s.blank();
    s.field_table(&[
        ("Impresa esecutrice", v(&data.company_name)),
        ("Partita IVA", v(&data.company_vat)),
        ("Cantiere", v(&data.site_address)),
        ("Committente", v(&data.client)),
        ("Natura dei lavori", v(&data.work_type)),
        ("Revisione", rev.to_string()),
        ("Data di emissione", today.clone()),
    ]);
    s.rule();

    s.line("## SEZIONE 2 - DATI GENERALI DEL LAVORO");
    s.blank();
    s.line("### 2.1 Descrizione dell'opera");
    s.blank();
    s.field_table(&[
        ("Indirizzo cantiere", v(&data.site_address)),
        ("Committente", v(&data.client)),
        ("Natura dei lavori", v(&data.work_type)),
        ("Importo lavori", format!("EUR {}", v(&data.budget))),
        ("Data inizio prevista", v(&data.start_date)),
        ("Data fine prevista", v(&data.end_date)),
        ("Numero massimo operai", workers_count),
    ]);
    s.blank();
    s.line("### 2.2 Elenco lavoratori impiegati in cantiere");
    s.blank();
    let workers: Vec<Vec<String>> = if data.workers.is_empty() {
        vec![vec![
            "1".to_string(),
            PLACEHOLDER.to_string(),
            PLACEHOLDER.to_string(),
            PLACEHOLDER.to_string(),
        ]]
    } else {
        data.workers
            .iter()
            .enumerate()
            .map(|(index, worker)| {
                vec![
                    (index + 1).to_string(),
                    v(&worker.name),
                    v(&worker.qualification),
                    v(&worker.matricola),
                ]
            })
            .collect()
    };
    s.table(&["N.", "Nominativo", "Qualifica", "Matricola"], workers);
    s.blank();
    s.text(WORKING_HOURS);
    s.rule();

    s.line("## SEZIONE 3 - SOGGETTI CON COMPITI DI SICUREZZA");
    s.blank();
    s.line("### 3.1 Organigramma della sicurezza in cantiere");
    s.blank();
    let technical_director = present(data.direttore_tecnico.as_deref())
        .or_else(|| present(data.responsabile_lavori.as_deref()))
        .map(str::to_string);
    let organigram = [
        ("Datore di Lavoro", v(&data.company_name)),
        ("Responsabile Lavori", v(&data.responsabile_lavori)),
        ("Coordinatore Sicurezza in fase di Progettazione (CSP)", v(&data.csp)),
        ("Coordinatore Sicurezza in fase di Esecuzione (CSE)", v(&data.cse)),
        ("Responsabile Servizio Prevenzione e Protezione (RSPP)", v(&data.rspp)),
        ("Rappresentante Lavoratori per la Sicurezza (RLS)", v(&data.rls)),
        ("Medico Competente", v(&data.medico)),
        ("Addetto Primo Soccorso", v(&data.primo_soccorso)),
        ("Addetto Antincendio ed Emergenze", v(&data.antincendio)),
        ("Direttore Tecnico di Cantiere", v(&technical_director)),
        ("Preposto/i", v(&data.preposto)),
    ];
    s.table(
        &["Ruolo", "Nominativo"],
        organigram
            .iter()
            .map(|(role, name)| vec![role.to_string(), name.clone()]),
    );
    s.blank();
    s.text(DUTIES);
    s.rule();

    s.text(SITE_AREA);
    s.rule();

    s.line("## SEZIONE 5 - LAVORAZIONI, RISCHI E MISURE DI PREVENZIONE");
    s.blank();
    if !data.selected_works.is_empty() {
        s.line("Lavorazioni previste in cantiere:");
        for work in &data.selected_works {
            s.line(format!("- {}", work.trim()));
        }
        s.blank();
    }
    match narrative.map(str::trim).filter(|text| !text.is_empty()) {
        Some(text) => s.line(text),
        None => s.line(MISSING_NARRATIVE),
    }
    s.rule();

    s.text(SIGNAGE);
    s.rule();
    s.text(EMERGENCY);
    s.rule();
    s.text(PPE);
    s.rule();
    s.text(EQUIPMENT);
    s.rule();
    s.text(SUBSTANCES);
    s.rule();
    s.text(WASTE);
    s.rule();
    s.text(TRAINING);
    s.rule();

    s.line("## SEZIONE 13 - SORVEGLIANZA SANITARIA");
    s.blank();
    s.line("### 13.1 Protocollo sanitario");
    s.line(format!(
        "Il Medico Competente ({}) definisce il protocollo sanitario in base ai rischi specifici delle mansioni svolte.",
        v(&data.medico)
    ));
    s.blank();
    s.text(HEALTH);
    s.rule();

    s.line("## SEZIONE 14 - FIRME E PRESA VISIONE");
    s.blank();
    s.line("Il presente Piano Operativo di Sicurezza e' stato redatto ai sensi del D.lgs 81/2008 e s.m.i. e viene sottoscritto dalle seguenti figure:");
    s.rule();
    let signatories = [
        ("Datore di Lavoro dell'impresa esecutrice", &data.company_name),
        ("Responsabile Servizio Prevenzione e Protezione (RSPP)", &data.rspp),
        ("Rappresentante dei Lavoratori per la Sicurezza (RLS)", &data.rls),
        ("Medico Competente", &data.medico),
        (
            "Coordinatore per la Sicurezza in fase di Esecuzione (CSE) - Per presa visione",
            &data.cse,
        ),
    ];
    for (role, name) in signatories {
        s.line(format!("**{role}**"));
        s.blank();
        s.line(format!("Nome: {}", v(name)));
        s.blank();
        s.line(SIGNATURE_FIELDS);
        s.rule();
    }
    s.line("**DICHIARAZIONE DEI LAVORATORI**");
    s.blank();
    s.line("I sottoscritti lavoratori dichiarano di aver ricevuto copia del presente POS, di averne compreso il contenuto e di impegnarsi al rispetto delle disposizioni in esso contenute.");
    s.blank();
    let declarations: Vec<Vec<String>> = if data.workers.is_empty() {
        (1..=3)
            .map(|n| {
                vec![
                    n.to_string(),
                    PLACEHOLDER.to_string(),
                    BLANK_CELL.to_string(),
                    BLANK_CELL.to_string(),
                ]
            })
            .collect()
    } else {
        data.workers
            .iter()
            .enumerate()
            .map(|(index, worker)| {
                vec![
                    (index + 1).to_string(),
                    v(&worker.name),
                    BLANK_CELL.to_string(),
                    BLANK_CELL.to_string(),
                ]
            })
            .collect()
    };
    s.table(&["N.", "Nominativo", "Data", "Firma"], declarations);
    s.rule();
    s.line(format!("*Documento generato con sistema ibrido template + AI - {today}*"));
    s.line(format!("*Revisione {rev}*"));
    s.out
}

const INTRO: &str = "
Il presente Piano Operativo di Sicurezza (POS) viene redatto ai sensi dell'art. 89, comma 1, lettera h) del D.lgs 81/2008 e s.m.i., come documento complementare al Piano di Sicurezza e Coordinamento (PSC), ove previsto.

Il POS contiene le informazioni relative alle specifiche attivita' lavorative dell'impresa esecutrice e le misure preventive e protettive integrative al PSC, necessarie per garantire la sicurezza e la salute dei lavoratori nel cantiere.
";

const WORKING_HOURS: &str = "
### 2.3 Orario di lavoro
- Orario ordinario: 08:00 - 12:00 / 13:00 - 17:00
- Sabato: solo se autorizzato dal Coordinatore per l'Esecuzione
- Lavoro notturno: non previsto (salvo autorizzazione specifica)

### 2.4 Turni di lavoro
Non sono previsti turni di lavoro, salvo diverse disposizioni del Direttore dei Lavori o del CSE.
";

const DUTIES: &str = "
### 3.2 Compiti e responsabilita'

**Datore di Lavoro:** Responsabile dell'organizzazione e della gestione della sicurezza in cantiere. Nomina le figure della sicurezza, fornisce i DPI, assicura la formazione e l'informazione dei lavoratori.

**RSPP:** Collabora con il Datore di Lavoro nella valutazione dei rischi, nell'elaborazione delle misure di prevenzione e protezione, nella scelta dei DPI e nell'organizzazione della formazione.

**RLS:** Rappresenta i lavoratori per quanto riguarda la sicurezza. Ha accesso alla documentazione, partecipa alle riunioni periodiche, puo' richiedere verifiche e sopralluoghi.

**Medico Competente:** Effettua la sorveglianza sanitaria, esprime i giudizi di idoneita', collabora alla valutazione dei rischi per gli aspetti sanitari.

**Preposto:** Sorveglia l'attivita' lavorativa, verifica il rispetto delle procedure di sicurezza, segnala tempestivamente le situazioni di pericolo.
";

const SITE_AREA: &str = "
## SEZIONE 4 - AREA DI CANTIERE E ORGANIZZAZIONE

### 4.1 Caratteristiche dell'area
L'area di cantiere sara' delimitata con recinzione perimetrale continua di altezza minima 2 metri. Gli accessi saranno controllati e dotati di cancello chiudibile a chiave.

### 4.2 Viabilita' di cantiere
- Accesso carraio: tramite cancello principale con larghezza minima 4 m
- Accesso pedonale: separato da quello carraio, con percorso protetto
- Velocita' massima in cantiere: 10 km/h

### 4.3 Impianti di cantiere
- Quadro generale di cantiere con interruttore differenziale (Id = 30 mA)
- Impianto di messa a terra con verifica biennale (DPR 462/01)
- Punti di distribuzione idrica per usi igienici e lavorativi

### 4.4 Servizi igienico-assistenziali
- Baraccamento spogliatoio con armadietti a doppio scomparto
- Servizi igienici chimici o allacciati alla rete fognaria (min. 1 ogni 10 lavoratori)
- Cassetta di primo soccorso conforme al D.M. 388/2003 (Gruppo B)

### 4.5 Gestione delle interferenze
In caso di presenza contemporanea di piu' imprese o lavoratori autonomi, il CSE coordina le attivita' mediante riunioni di coordinamento.
";

const SIGNAGE: &str = "
## SEZIONE 6 - SEGNALETICA DI SICUREZZA (ISO 7010)

### 6.1 Segnaletica di divieto, avvertimento e obbligo
| Codice | Segnale | Ubicazione |
|--------|---------|------------|
| P002 | Vietato fumare | Depositi, baraccamenti |
| P006 | Vietato l'accesso ai non addetti ai lavori | Ingresso cantiere, zone pericolose |
| W001 | Pericolo generico | Zone a rischio specifico |
| W009 | Caduta con dislivello | Bordi scavi, aperture nel vuoto |
| W012 | Pericolo scivolamento | Aree bagnate |
| M002 | Casco di protezione obbligatorio | Tutto il cantiere |
| M008 | Calzature di sicurezza obbligatorie | Tutto il cantiere |
| M014 | Imbracatura di sicurezza obbligatoria | Lavori in quota >2 m |

### 6.2 Segnaletica di salvataggio e antincendio
| Codice | Segnale | Ubicazione |
|--------|---------|------------|
| E001 | Uscita di emergenza | Vie di fuga |
| E003 | Primo soccorso | Presso cassetta PS |
| F001 | Estintore | Presso ogni estintore |
| F002 | Idrante | Presso ogni idrante |
";

const EMERGENCY: &str = "
## SEZIONE 7 - PROCEDURE DI EMERGENZA

### 7.1 Numeri utili di emergenza
| Servizio | Numero |
|----------|--------|
| Emergenza unica europea | **112** |
| Vigili del Fuoco | **115** |
| Emergenza sanitaria | **118** |
| Polizia di Stato | **113** |
| Carabinieri | **112** |
| Centro Antiveleni (Milano) | **02 66101029** |
| INAIL (denuncia infortuni) | **06 6001** |

### 7.2 Procedura di emergenza incendio
1. Chi rileva l'incendio avvisa immediatamente l'Addetto Antincendio e il Preposto
2. Se l'incendio non e' controllabile, attivare l'allarme e chiamare il 115
3. Evacuare l'area seguendo le vie di fuga predisposte
4. Raggiungere il punto di raccolta ed effettuare l'appello nominativo

### 7.3 Procedura di primo soccorso
1. Chi rileva l'infortunio avvisa immediatamente l'Addetto Primo Soccorso
2. Chiamare il 118 fornendo: luogo esatto, numero infortunati, dinamica, condizioni
3. Non spostare l'infortunato salvo pericolo imminente
4. Compilare il registro infortuni e la denuncia INAIL entro 48 ore

### 7.4 Punto di raccolta
Il punto di raccolta e' individuato in area esterna al cantiere, facilmente raggiungibile e segnalato con cartello E007 (Punto di raccolta).
";

const PPE: &str = "
## SEZIONE 8 - DISPOSITIVI DI PROTEZIONE INDIVIDUALE (DPI)

### 8.1 Obblighi generali
Il Datore di Lavoro fornisce ai lavoratori i DPI necessari, conformi al Regolamento UE 2016/425, adeguati ai rischi specifici e mantenuti in buono stato.

### 8.2 DPI di base obbligatori in cantiere
| DPI | Norma di riferimento | Categoria | Note |
|-----|---------------------|-----------|------|
| Casco di protezione | UNI EN 397:2012 | II | Obbligatorio in tutta l'area di cantiere |
| Calzature di sicurezza S3 | UNI EN ISO 20345:2022 | II | Puntale 200J, suola antiperforazione, antiscivolo |
| Guanti da lavoro | UNI EN 388:2016 | II | Resistenza al taglio, all'abrasione e alla perforazione |
| Giubbotto alta visibilita' | UNI EN ISO 20471:2013 | II | Classe 2 minimo, obbligatorio in zone di transito mezzi |
| Occhiali di protezione | UNI EN 166:2001 | II | Per lavorazioni con proiezione schegge/polveri |

### 8.3 DPI specifici per lavorazioni a rischio
| DPI | Norma di riferimento | Impiego |
|-----|---------------------|---------|
| Imbracatura anticaduta | UNI EN 361:2002 | Lavori in quota >2 m senza protezioni collettive |
| Cuffie/inserti auricolari | UNI EN 352-1/2:2020 | Esposizione rumore >85 dB(A) |
| Facciale filtrante FFP2/FFP3 | UNI EN 149:2009 | Polveri, fibre, vapori |
| Guanti anticalore | UNI EN 407:2020 | Saldatura, taglio termico |
";

const EQUIPMENT: &str = "
## SEZIONE 9 - MACCHINE, ATTREZZATURE E VERIFICHE

### 9.1 Disposizioni generali
Tutte le macchine e attrezzature utilizzate in cantiere devono essere conformi alle direttive europee applicabili, dotate di marcatura CE e di dichiarazione di conformita'.

### 9.2 Verifiche obbligatorie
| Attrezzatura | Verifica | Frequenza | Riferimento |
|-------------|----------|-----------|-------------|
| Gru su autocarro | Prima verifica + periodica | Annuale | All. VII D.lgs 81/08 |
| Piattaforme elevabili (PLE) | Prima verifica + periodica | Annuale | All. VII D.lgs 81/08 |
| Ponteggi metallici | Verifica prima del montaggio | Ad ogni montaggio | Art. 137 D.lgs 81/08 |
| Impianto elettrico | Verifica impianto di terra | Biennale | DPR 462/01 |
";

const SUBSTANCES: &str = "
## SEZIONE 10 - SOSTANZE E PREPARATI PERICOLOSI

Per ogni sostanza pericolosa utilizzata in cantiere e' necessario:
- Disporre della Scheda Dati di Sicurezza (SDS) aggiornata in 16 sezioni (Reg. REACH)
- Conservare le SDS in luogo accessibile a tutti i lavoratori
- Stoccare le sostanze in area dedicata con bacino di contenimento
";

const WASTE: &str = "
## SEZIONE 11 - GESTIONE RIFIUTI

La gestione dei rifiuti prodotti in cantiere e' effettuata nel rispetto del D.lgs 152/2006 (Testo Unico Ambientale) e s.m.i.

| Codice CER | Descrizione | Tipo | Gestione |
|------------|-------------|------|----------|
| 17 01 07 | Miscugli di cemento, mattoni, mattonelle | Non pericoloso | Recupero/discarica |
| 17 04 05 | Ferro e acciaio | Non pericoloso | Recupero |
| 17 09 04 | Rifiuti misti di costruzione e demolizione | Non pericoloso | Recupero/discarica |
| 17 06 01* | Materiali isolanti contenenti amianto | **Pericoloso** | Ditta specializzata |
";

const TRAINING: &str = "
## SEZIONE 12 - FORMAZIONE E INFORMAZIONE DEI LAVORATORI

| Tipo di formazione | Durata | Aggiornamento | Note |
|-------------------|--------|---------------|------|
| Formazione generale | 4 ore | - | Valida per sempre |
| Formazione specifica (rischio alto - edilizia) | 12 ore | 6 ore ogni 5 anni | Obbligatoria per cantieri |
| Preposto | 8 ore aggiuntive | 6 ore ogni 2 anni | Per chi svolge funzioni di preposto |
| Primo Soccorso (Gruppo B) | 12 ore | 4 ore ogni 3 anni | Per gli addetti designati |
| Antincendio (rischio medio) | 8 ore | 5 ore ogni 5 anni | Per gli addetti designati |
";

const HEALTH: &str = "
- **Visita medica preventiva:** prima dell'assunzione o del cambio mansione
- **Visita medica periodica:** secondo le periodicita' stabilite dal protocollo
- **Visita medica al rientro:** dopo assenza >60 giorni per malattia
";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::{Block, tokenize};

    fn issued() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).expect("date")
    }

    #[test]
    fn placeholder_covers_missing_blank_and_sentinel() {
        assert_eq!(placeholder(None), PLACEHOLDER);
        assert_eq!(placeholder(Some("   ")), PLACEHOLDER);
        assert_eq!(placeholder(Some("N/A")), PLACEHOLDER);
        assert_eq!(placeholder(Some(" Edil Rossi ")), "Edil Rossi");
    }

    #[test]
    fn site_data_accepts_numbers_and_nulls() {
        let data: SiteData = serde_json::from_value(serde_json::json!({
            "siteName": "Scuola Manzoni",
            "budget": 250000,
            "numWorkers": 6,
            "cse": null,
            "workers": [{"name": "Luca Bianchi", "qualification": "Operaio"}]
        }))
        .expect("site data");
        assert_eq!(data.budget.as_deref(), Some("250000"));
        assert_eq!(data.num_workers.as_deref(), Some("6"));
        assert_eq!(data.cse, None);
        assert_eq!(data.workers[0].matricola, None);
    }

    #[test]
    fn sentinel_values_never_reach_the_source() {
        let data = SiteData {
            company_name: Some("N/A".to_string()),
            site_address: Some("".to_string()),
            client: Some("Comune di Bergamo".to_string()),
            ..SiteData::default()
        };
        let source = build_document_source(&data, "2", None, issued());
        assert!(!source.contains("N/A"));
        assert!(source.contains("| Committente | Comune di Bergamo |"));
        assert!(source.contains("**Impresa Esecutrice:** [DA COMPILARE]"));
        assert!(source.contains("| Data di emissione | 16/10/2026 |"));
    }

    #[test]
    fn missing_narrative_leaves_a_callout() {
        let source = build_document_source(&SiteData::default(), "1", Some("  "), issued());
        assert!(source.contains(MISSING_NARRATIVE));

        let narrative = "### 5.1 Scavi\n| Rischio | P | D | R (PxD) |\n|---|---|---|---|\n| Seppellimento | 3 | 4 | 12 |";
        let source = build_document_source(&SiteData::default(), "1", Some(narrative), issued());
        assert!(!source.contains(MISSING_NARRATIVE));
        assert!(source.contains("| Seppellimento | 3 | 4 | 12 |"));
    }

    #[test]
    fn workers_fill_both_tables() {
        let data = SiteData {
            workers: vec![
                Worker {
                    name: Some("Luca Bianchi".to_string()),
                    qualification: Some("Carpentiere".to_string()),
                    matricola: None,
                },
                Worker::default(),
            ],
            ..SiteData::default()
        };
        let source = build_document_source(&data, "1", None, issued());
        assert!(source.contains("| 1 | Luca Bianchi | Carpentiere | [DA COMPILARE] |"));
        assert!(source.contains("| Numero massimo operai | 2 |"));
        assert!(source.contains("| 1 | Luca Bianchi | _________________ | _________________ |"));
    }

    #[test]
    fn signature_section_tokenizes_into_signature_lines() {
        let source = build_document_source(&SiteData::default(), "1", None, issued());
        assert!(source.contains("## SEZIONE 14 - FIRME E PRESA VISIONE"));
        let blocks = tokenize(&source);
        let signatures = blocks
            .iter()
            .filter(|b| matches!(b, Block::SignatureLine { .. }))
            .count();
        assert_eq!(signatures, 5);
        assert!(blocks.iter().any(|b| matches!(
            b,
            Block::SectionBanner { number, .. } if number == "14"
        )));
    }

    #[test]
    fn pipes_inside_values_do_not_split_cells() {
        let data = SiteData {
            client: Some("Alfa | Beta".to_string()),
            ..SiteData::default()
        };
        let source = build_document_source(&data, "1", None, issued());
        assert!(source.contains("| Committente | Alfa / Beta |"));
    }
}
