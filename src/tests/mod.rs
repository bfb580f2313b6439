mod demo_nlp;
mod scenarios;
