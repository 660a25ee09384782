//! Loading application configuration (prompts + optional topic bank) from TOML.
//!
//! See `AppConfig` and `Prompts` for expected schema.

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::TopicEntry;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub prompts: Prompts,
  /// Extra topic bank entries appended to the built-in catalog.
  #[serde(default)]
  pub topics: Vec<TopicEntry>,
}

/// Prompts used by the Gemini client. Defaults target the Brazilian Ensino
/// Fundamental curriculum; override them in TOML to tune tone/structure.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  // Placement test generation
  pub placement_system: String,
  pub placement_user_template: String,
  // Topic activity generation
  pub activity_system: String,
  pub activity_user_template: String,
  // Progress insights
  pub insights_system: String,
  pub insights_user_template: String,
  // Tutor-authored (custom) activity generation
  pub custom_system: String,
  pub custom_user_template: String,
  /// Reference text injected as `{curriculum}` into the templates above.
  pub curriculum_reference: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      placement_system: "Você é um especialista em avaliação educacional para o Ensino Fundamental no Brasil. Responda APENAS com JSON estrito.".into(),
      placement_user_template: "Gere uma avaliação de nivelamento com 12 questões de múltipla escolha para um aluno do {grade}: 2 questões para cada uma das matérias Português, Matemática, Ciências, História, Geografia e Lógica. Adapte a complexidade ao nível escolar. Cada questão deve ter 4 opções, sendo apenas uma correta, e o campo \"subject\" com o nome da matéria correspondente.\n\nConteúdo de referência (BNCC):\n---\n{curriculum}\n---\n\nA saída deve ser um JSON Array de objetos {\"question\", \"options\", \"correctAnswer\", \"subject\"}, sem nenhum texto adicional.".into(),
      activity_system: "Você é um tutor de IA criando uma atividade educacional. Responda APENAS com JSON estrito.".into(),
      activity_user_template: "Gere 3 questões de múltipla escolha sobre o tópico \"{topic}\", matéria {subject}, adequadas para um aluno do {grade}. Cada questão deve ter 4 opções, apenas uma correta. Certifique-se de que as questões sejam claras e relevantes para o tópico. No campo \"subject\", use o valor \"{subject}\".\n\nConteúdo de referência (BNCC):\n---\n{curriculum}\n---\n\nA saída deve ser um JSON Array de objetos {\"question\", \"options\", \"correctAnswer\", \"subject\"}, sem nenhum texto adicional.".into(),
      insights_system: "Você é um psicopedagogo e analista de dados educacionais. Responda APENAS com JSON estrito.".into(),
      insights_user_template: "Analise os dados de desempenho de um aluno e forneça insights para o tutor.\n\nDados do aluno:\n- Nome: {student_name}\n- Série/Ano: {grade}\n- Resultados do teste de nivelamento: {placement_json}\n\nDesempenho nas atividades:\n{performance_json}\n\nBaseado em TODOS os dados acima, gere um objeto JSON com duas chaves: \"lessonSuggestions\" (array de 3 sugestões curtas e acionáveis de tópicos de aula) e \"hubData\" (um objeto por matéria principal — Português, Matemática, Ciências, História, Geografia — com \"subject\", \"level\" entre 'Iniciante', 'Em Desenvolvimento', 'Adequado' e 'Avançado', \"summary\" com 1-2 frases sobre as dificuldades observadas e \"suggestions\" com temas e tipos de exercícios para supri-las).".into(),
      custom_system: "Você é um assistente de IA para tutores, criando uma atividade educacional personalizada. Responda APENAS com JSON estrito.".into(),
      custom_user_template: "Informações da atividade:\n- Título: {title}\n- Série/Ano do aluno: {grade}\n- Instruções do tutor: \"{instructions}\"\n{source_block}\nGere até 5 questões de múltipla escolha com 4 opções cada, apenas uma correta. Se as instruções do tutor já contiverem perguntas e opções formatadas, apenas converta-as para o formato JSON; caso contrário, crie as perguntas com base no conteúdo fornecido. O campo \"subject\" deve ser derivado do título ou das instruções; se não for claro, use \"Personalizada\".\n\nConteúdo de referência (BNCC):\n---\n{curriculum}\n---\n\nA saída deve ser um JSON Array de objetos {\"question\", \"options\", \"correctAnswer\", \"subject\"}, sem nenhum texto adicional.".into(),
      curriculum_reference: "Resumo do roteiro pedagógico baseado na BNCC para o Ensino Fundamental.\n\n1. Linguagens — Português: alfabetização (1º-2º ano), leitura, escrita, oralidade e análise linguística; decodificação, compreensão e produção textual, convenções da escrita (ortografia, pontuação); nos anos finais, gêneros textuais, figuras de linguagem e argumentação.\n2. Matemática — raciocínio lógico e resolução de problemas. Números: sistema decimal, quatro operações, frações e números racionais. Álgebra (anos finais): expressões e equações de 1º e 2º grau. Geometria: figuras, grandezas e medidas (comprimento, área, volume, tempo). Probabilidade e estatística: leitura de gráficos e tabelas.\n3. Ciências da Natureza — Matéria e energia: propriedades dos materiais, transformações físicas e químicas, fontes de energia. Vida e evolução: seres vivos, corpo humano, saúde, ecossistemas. Terra e universo: Sistema Solar, movimentos da Terra, ciclo da água.\n4. Ciências Humanas — Geografia: lugares de vivência, paisagens, mapas, população brasileira, dinâmicas urbanas e rurais, continentes. História: identidade pessoal e familiar, marcos históricos, povos indígenas, colonização do Brasil, República, eventos mundiais.\n5. Lógica e raciocínio — habilidades transversais: observar, identificar padrões, resolver problemas não convencionais e argumentar com base em evidências.".into(),
    }
  }
}

/// Attempt to load `AppConfig` from APP_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_app_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("APP_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "edututor_backend", %path, "Loaded app config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "edututor_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "edututor_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
